//! The emulated UART device and its lifecycle.
//!
//! [`PipeUart`] owns both transport endpoints, the state of the asynchronous
//! and interrupt engines, and the timer wheel that drives them. All engine
//! progress happens inside [`PipeUart::dispatch`]; the driver-facing
//! operations only record requests and arm timers.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, error, info, trace};
use uart_hal::{AsyncCallback, HalError, HalResult, IrqCallback, UartPoll};

use crate::async_tx::AsyncTransfer;
use crate::clock::{Clock, MonotonicClock};
use crate::config::PipeUartConfig;
use crate::error::{hal_error, PipeUartError};
use crate::irq::IrqState;
use crate::timer::{TimerId, TimerWheel};
use crate::transport::{FifoEndpoint, Transport};

/// UART peripheral emulated on top of two unidirectional transports.
pub struct PipeUart<T: Transport> {
    pub(crate) config: PipeUartConfig,
    pub(crate) rx: T,
    pub(crate) tx: T,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) timers: TimerWheel,
    pub(crate) async_rx: AsyncTransfer,
    pub(crate) async_tx: AsyncTransfer,
    pub(crate) async_cb: Option<AsyncCallback<Self>>,
    pub(crate) irq: IrqState,
    pub(crate) irq_cb: Option<IrqCallback<Self>>,
    dispatching: bool,
    closed: bool,
}

impl PipeUart<FifoEndpoint> {
    /// Opens both FIFOs, waiting for a peer on each.
    ///
    /// The inbound pipe is opened first. Failure of either open is fatal for
    /// the device.
    pub fn open(config: PipeUartConfig) -> Result<Self, PipeUartError> {
        let rx = FifoEndpoint::open(
            &config.rx_path,
            uart_hal::Direction::Inbound,
            config.open_spin,
            config.connect_timeout,
        )?;
        let tx = FifoEndpoint::open(
            &config.tx_path,
            uart_hal::Direction::Outbound,
            config.open_spin,
            config.connect_timeout,
        )?;

        info!(
            "pipe UART ready: rx {} tx {}",
            config.rx_path.display(),
            config.tx_path.display()
        );
        Ok(Self::with_transport(
            config,
            rx,
            tx,
            Arc::new(MonotonicClock::new()),
        ))
    }
}

impl<T: Transport> PipeUart<T> {
    /// Builds a device over already-connected transports.
    pub fn with_transport(config: PipeUartConfig, rx: T, tx: T, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            rx,
            tx,
            clock,
            timers: TimerWheel::new(),
            async_rx: AsyncTransfer::default(),
            async_tx: AsyncTransfer::default(),
            async_cb: None,
            irq: IrqState::default(),
            irq_cb: None,
            dispatching: false,
            closed: false,
        }
    }

    pub fn config(&self) -> &PipeUartConfig {
        &self.config
    }

    /// Current time on the device clock.
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    pub fn timers(&self) -> &TimerWheel {
        &self.timers
    }

    /// Earliest pending timer deadline, if any timer is armed.
    pub fn next_deadline(&self) -> Option<Duration> {
        if self.closed {
            None
        } else {
            self.timers.next_deadline()
        }
    }

    pub fn is_open(&self) -> bool {
        !self.closed
    }

    /// Closes both transports and stops all timers. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.timers.disarm_all();
        self.rx.close();
        self.tx.close();
        info!("pipe UART closed");
    }

    /// Fires every timer that is due, including timers re-armed with zero
    /// delay by the callbacks it runs. Returns the number of timers fired.
    ///
    /// Calls made from inside a callback return immediately.
    pub fn dispatch(&mut self) -> usize {
        if self.closed {
            return 0;
        }
        if self.dispatching {
            debug!("dispatch re-entered from a callback, ignored");
            return 0;
        }

        self.dispatching = true;
        let now = self.clock.now();
        let mut fired = 0;
        while let Some(id) = self.timers.pop_expired(now) {
            trace!("{id} fired at {now:?}");
            fired += 1;
            match id {
                TimerId::AsyncRetry => self.async_retry(),
                TimerId::AsyncExpiry(direction) => self.async_expired(direction),
                TimerId::IrqRetry => self.irq_retry(),
            }
        }
        self.dispatching = false;
        fired
    }

    /// Arms `id` to fire on the next dispatch.
    pub(crate) fn arm_now(&mut self, id: TimerId) {
        if self.closed {
            return;
        }
        let now = self.clock.now();
        self.timers.arm_no_later(id, now);
    }

    /// Arms `id` one retry delay from now.
    pub(crate) fn arm_retry(&mut self, id: TimerId) {
        if self.closed {
            return;
        }
        let deadline = self.clock.now() + self.config.retry_delay;
        self.timers.arm_no_later(id, deadline);
    }
}

impl<T: Transport> UartPoll for PipeUart<T> {
    fn send_byte(&mut self, byte: u8) -> HalResult<()> {
        trace!("send {byte:#04x}");
        loop {
            match self.tx.try_write(&[byte]) {
                Ok(1) => return Ok(()),
                Ok(_) | Err(nb::Error::WouldBlock) => thread::sleep(self.config.poll_backoff),
                Err(nb::Error::Other(err)) => {
                    error!("tx pipe failed: {err}");
                    return Err(hal_error(&err));
                }
            }
        }
    }

    fn receive_byte(&mut self) -> nb::Result<u8, HalError> {
        let mut cell = [0u8; 1];
        match self.rx.try_read(&mut cell) {
            Ok(1) => {
                trace!("received {:#04x}", cell[0]);
                Ok(cell[0])
            }
            Ok(_) | Err(nb::Error::WouldBlock) => Err(nb::Error::WouldBlock),
            Err(nb::Error::Other(err)) => {
                error!("rx pipe failed: {err}");
                Err(nb::Error::Other(hal_error(&err)))
            }
        }
    }
}

impl<T: Transport> Drop for PipeUart<T> {
    fn drop(&mut self) {
        self.close();
    }
}
