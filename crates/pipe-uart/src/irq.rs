//! Interrupt emulation layer.
//!
//! Each direction holds a single byte and a `pending` flag whose meaning
//! depends on the direction:
//!
//! - TX: `pending` means a byte was queued by [`UartIrq::fifo_fill`] and
//!   has not been written to the transport yet.
//! - RX: `pending` means the holding cell needs a fresh byte from the
//!   transport. Once the byte arrives, `pending` clears and the byte waits
//!   for [`UartIrq::fifo_read`].
//!
//! Notifications are level-triggered: enabling a direction whose condition
//! already holds invokes the callback before returning.

use log::{debug, trace, warn};
use uart_hal::{HalError, HalResult, IrqCallback, UartIrq};

use crate::device::PipeUart;
use crate::timer::TimerId;
use crate::transport::Transport;

/// Single-byte FIFO state for one direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterruptEndpoint {
    pub enabled: bool,
    pub pending: bool,
    pub byte: u8,
}

impl InterruptEndpoint {
    /// The level the callback reports: enabled with nothing pending.
    pub fn is_ready(&self) -> bool {
        self.enabled && !self.pending
    }
}

#[derive(Debug)]
pub(crate) struct IrqState {
    pub(crate) tx: InterruptEndpoint,
    pub(crate) rx: InterruptEndpoint,
    in_callback: bool,
    reraised: bool,
}

impl Default for IrqState {
    fn default() -> Self {
        Self {
            tx: InterruptEndpoint::default(),
            // nothing has been received yet
            rx: InterruptEndpoint {
                pending: true,
                ..InterruptEndpoint::default()
            },
            in_callback: false,
            reraised: false,
        }
    }
}

impl<T: Transport> PipeUart<T> {
    pub fn irq_tx_state(&self) -> InterruptEndpoint {
        self.irq.tx
    }

    pub fn irq_rx_state(&self) -> InterruptEndpoint {
        self.irq.rx
    }

    /// Retry timer: fill the RX holding cell, then drain the TX byte.
    pub(crate) fn irq_retry(&mut self) {
        let mut rearm = false;

        if self.irq.rx.pending {
            let mut cell = [0u8; 1];
            match self.rx.try_read(&mut cell) {
                Ok(1) => {
                    trace!("irq rx {:#04x}", cell[0]);
                    self.irq.rx.byte = cell[0];
                    self.irq.rx.pending = false;
                    if self.irq.rx.enabled {
                        self.raise_irq();
                    } else {
                        debug!("rx byte held until rx irq is enabled");
                    }
                }
                Ok(_) | Err(nb::Error::WouldBlock) => rearm = true,
                Err(nb::Error::Other(err)) => {
                    warn!("rx pipe read failed, retrying: {err}");
                    rearm = true;
                }
            }
        }

        if self.irq.tx.pending {
            match self.tx.try_write(&[self.irq.tx.byte]) {
                Ok(1) => {
                    trace!("irq tx {:#04x}", self.irq.tx.byte);
                    // stays clear until the next fifo_fill
                    self.irq.tx.pending = false;
                    if self.irq.tx.enabled {
                        self.raise_irq();
                    }
                }
                Ok(_) | Err(nb::Error::WouldBlock) => rearm = true,
                Err(nb::Error::Other(err)) => {
                    warn!("tx pipe write failed, retrying: {err}");
                    rearm = true;
                }
            }
        }

        if rearm {
            self.arm_retry(TimerId::IrqRetry);
        }
    }

    /// Runs the interrupt callback.
    ///
    /// A notification raised while the callback is running (for example by
    /// enabling TX from the RX handler) is latched and the callback runs
    /// again once it returns, like a level-triggered line that stays
    /// asserted.
    fn raise_irq(&mut self) {
        if self.irq.in_callback {
            self.irq.reraised = true;
            return;
        }
        let Some(mut callback) = self.irq_cb.take() else {
            debug!("no irq callback registered");
            return;
        };

        self.irq.in_callback = true;
        loop {
            self.irq.reraised = false;
            callback(self);
            if !self.irq.reraised {
                break;
            }
        }
        self.irq.in_callback = false;

        if self.irq_cb.is_none() {
            self.irq_cb = Some(callback);
        }
    }
}

impl<T: Transport> UartIrq for PipeUart<T> {
    /// Installs `callback` and starts filling the RX holding cell.
    fn register_irq_callback(&mut self, callback: IrqCallback<Self>) {
        self.irq_cb = Some(callback);
        debug!("irq callback registered");
        if self.irq.rx.pending {
            self.arm_now(TimerId::IrqRetry);
        }
    }

    fn fifo_fill(&mut self, data: &[u8]) -> usize {
        let Some(&byte) = data.first() else {
            return 0;
        };
        if self.irq.tx.pending {
            trace!("tx fifo full");
            return 0;
        }

        self.irq.tx.byte = byte;
        self.irq.tx.pending = true;
        self.arm_now(TimerId::IrqRetry);
        1
    }

    fn fifo_read(&mut self, buf: &mut [u8]) -> usize {
        let Some(slot) = buf.first_mut() else {
            return 0;
        };
        if self.irq.rx.pending {
            trace!("rx fifo empty");
            return 0;
        }

        *slot = self.irq.rx.byte;
        self.irq.rx.pending = true;
        self.arm_now(TimerId::IrqRetry);
        1
    }

    fn irq_tx_enable(&mut self) {
        debug!("tx irq enabled");
        self.irq.tx.enabled = true;
        if !self.irq.tx.pending {
            self.raise_irq();
        }
    }

    fn irq_tx_disable(&mut self) {
        debug!("tx irq disabled");
        self.irq.tx.enabled = false;
    }

    fn irq_tx_ready(&self) -> bool {
        self.irq.tx.is_ready()
    }

    /// Draining the FIFO and finishing the transfer look the same here.
    fn irq_tx_complete(&self) -> HalResult<bool> {
        Err(HalError::NotImplemented)
    }

    fn irq_rx_enable(&mut self) {
        debug!("rx irq enabled");
        self.irq.rx.enabled = true;
        if !self.irq.rx.pending {
            self.raise_irq();
        }
    }

    fn irq_rx_disable(&mut self) {
        debug!("rx irq disabled");
        self.irq.rx.enabled = false;
    }

    fn irq_rx_ready(&self) -> bool {
        self.irq.rx.is_ready()
    }

    // the transport never reports framing or parity errors
    fn irq_err_enable(&mut self) {}

    fn irq_err_disable(&mut self) {}

    fn irq_is_pending(&self) -> bool {
        self.irq.tx.is_ready() || self.irq.rx.is_ready()
    }

    fn irq_update(&mut self) -> bool {
        true
    }
}
