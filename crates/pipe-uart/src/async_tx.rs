//! Asynchronous transfer engine.
//!
//! Each direction tracks at most one transfer. Transfers make progress only
//! when the shared retry timer fires; a finite timeout arms a per-direction
//! expiry timer that races the retry timer. Whichever fires first finishes
//! the transfer, and the loser finds the direction idle and does nothing.

use std::time::Duration;

use log::{debug, trace, warn};
use uart_hal::{AsyncCallback, Direction, HalError, HalResult, Rejected, UartAsync, UartEvent};

use crate::device::PipeUart;
use crate::timer::TimerId;
use crate::transport::Transport;

/// One direction's transfer: idle when no buffer is installed.
#[derive(Debug, Default)]
pub struct AsyncTransfer {
    buf: Option<Vec<u8>>,
    moved: usize,
}

impl AsyncTransfer {
    pub fn is_active(&self) -> bool {
        self.buf.is_some()
    }

    /// Bytes moved so far.
    pub fn moved(&self) -> usize {
        self.moved
    }

    /// Total length of the active transfer, 0 when idle.
    pub fn len(&self) -> usize {
        self.buf.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_complete(&self) -> bool {
        self.moved == self.len()
    }

    /// Idle → Active. Hands the buffer back if a transfer is in flight.
    fn begin(&mut self, buf: Vec<u8>) -> Result<(), Vec<u8>> {
        if self.is_active() {
            return Err(buf);
        }
        self.buf = Some(buf);
        self.moved = 0;
        Ok(())
    }

    fn advance(&mut self, n: usize) {
        self.moved += n;
        debug_assert!(self.moved <= self.len());
    }

    /// Active → Idle, returning the caller's buffer.
    fn finish(&mut self) -> Option<Vec<u8>> {
        self.moved = 0;
        self.buf.take()
    }

    fn remaining(&self) -> &[u8] {
        match self.buf.as_deref() {
            Some(buf) => &buf[self.moved..],
            None => &[],
        }
    }

    fn remaining_mut(&mut self) -> &mut [u8] {
        match self.buf.as_deref_mut() {
            Some(buf) => &mut buf[self.moved..],
            None => &mut [],
        }
    }
}

impl<T: Transport> PipeUart<T> {
    /// State of the transfer on `direction`.
    pub fn transfer(&self, direction: Direction) -> &AsyncTransfer {
        match direction {
            Direction::Inbound => &self.async_rx,
            Direction::Outbound => &self.async_tx,
        }
    }

    fn transfer_mut(&mut self, direction: Direction) -> &mut AsyncTransfer {
        match direction {
            Direction::Inbound => &mut self.async_rx,
            Direction::Outbound => &mut self.async_tx,
        }
    }

    /// Retry timer: one I/O attempt per active direction, receive first.
    pub(crate) fn async_retry(&mut self) {
        if self.async_rx.is_active() {
            match self.rx.try_read(self.async_rx.remaining_mut()) {
                Ok(n) => {
                    self.async_rx.advance(n);
                    trace!("read {} of {}", self.async_rx.moved(), self.async_rx.len());
                }
                Err(nb::Error::WouldBlock) => {}
                Err(nb::Error::Other(err)) => warn!("rx pipe read failed, retrying: {err}"),
            }

            if self.async_rx.is_complete() {
                self.finish_rx(true);
            } else {
                self.arm_retry(TimerId::AsyncRetry);
            }
        }

        if self.async_tx.is_active() {
            match self.tx.try_write(self.async_tx.remaining()) {
                Ok(n) => {
                    self.async_tx.advance(n);
                    trace!("wrote {} of {}", self.async_tx.moved(), self.async_tx.len());
                }
                Err(nb::Error::WouldBlock) => {}
                Err(nb::Error::Other(err)) => warn!("tx pipe write failed, retrying: {err}"),
            }

            if self.async_tx.is_complete() {
                self.finish_tx(true);
            } else {
                self.arm_retry(TimerId::AsyncRetry);
            }
        }
    }

    /// Expiry timer for `direction`.
    pub(crate) fn async_expired(&mut self, direction: Direction) {
        let transfer = self.transfer(direction);
        if !transfer.is_active() {
            debug!("{direction} expiry after completion, ignored");
            return;
        }

        warn!(
            "{direction} transfer timed out after {} of {} bytes",
            transfer.moved(),
            transfer.len()
        );
        match direction {
            Direction::Inbound => self.finish_rx(false),
            Direction::Outbound => self.finish_tx(false),
        }
    }

    /// Reports a finished receive as data-ready, buffer-released, disabled.
    fn finish_rx(&mut self, complete: bool) {
        self.timers.disarm(TimerId::AsyncExpiry(Direction::Inbound));
        let Some(buf) = self.async_rx.finish() else {
            return;
        };
        debug!("rx {}", if complete { "complete" } else { "expired" });

        let len = if complete { buf.len() } else { 0 };
        self.emit_async(UartEvent::RxReady { data: &buf[..len] });
        self.emit_async(UartEvent::RxBufReleased { buf });
        self.emit_async(UartEvent::RxDisabled);
    }

    fn finish_tx(&mut self, complete: bool) {
        self.timers.disarm(TimerId::AsyncExpiry(Direction::Outbound));
        let Some(buf) = self.async_tx.finish() else {
            return;
        };
        debug!("tx {}", if complete { "complete" } else { "expired" });

        let event = if complete {
            UartEvent::TxDone {
                len: buf.len(),
                buf,
            }
        } else {
            UartEvent::TxAborted { buf }
        };
        self.emit_async(event);
    }

    /// Hands `event` to the registered callback. The callback is taken out
    /// of the device while it runs, so it may start new transfers.
    fn emit_async(&mut self, event: UartEvent<'_>) {
        let Some(mut callback) = self.async_cb.take() else {
            debug!("no async callback registered, dropping {event:?}");
            return;
        };
        callback(self, event);
        if self.async_cb.is_none() {
            self.async_cb = Some(callback);
        }
    }
}

impl<T: Transport> UartAsync for PipeUart<T> {
    /// Installs `callback` and resets both directions.
    fn register_callback(&mut self, callback: AsyncCallback<Self>) {
        for direction in Direction::ALL {
            if let Some(buf) = self.transfer_mut(direction).finish() {
                debug!("dropping in-flight {direction} buffer of {} bytes", buf.len());
            }
            self.timers.disarm(TimerId::AsyncExpiry(direction));
        }
        self.timers.disarm(TimerId::AsyncRetry);
        self.async_cb = Some(callback);
        debug!("async callback registered");
    }

    fn start_transfer(
        &mut self,
        direction: Direction,
        buf: Vec<u8>,
        timeout: Option<Duration>,
    ) -> Result<(), Rejected> {
        if !self.is_open() {
            return Err(Rejected::new(HalError::Disconnected, buf));
        }
        if buf.is_empty() {
            warn!("{direction} transfer rejected: empty buffer");
            return Err(Rejected::new(HalError::InvalidParameter, buf));
        }

        let len = buf.len();
        if let Err(buf) = self.transfer_mut(direction).begin(buf) {
            let active = self.transfer(direction);
            warn!(
                "{direction} transfer already in progress ({} of {} bytes)",
                active.moved(),
                active.len()
            );
            return Err(Rejected::new(HalError::AlreadyInProgress, buf));
        }
        debug!("{direction} transfer of {len} bytes, timeout {timeout:?}");

        // always move data from timer context
        self.arm_now(TimerId::AsyncRetry);
        let expiry = TimerId::AsyncExpiry(direction);
        // a deadline past the clock's range never expires
        match timeout.and_then(|timeout| self.now().checked_add(timeout)) {
            Some(deadline) => self.timers.arm(expiry, deadline),
            None => {
                self.timers.disarm(expiry);
            }
        }
        Ok(())
    }

    fn tx_abort(&mut self) -> HalResult<()> {
        Err(HalError::NotSupported)
    }

    fn rx_buf_rsp(&mut self, buf: Vec<u8>) -> Result<(), Rejected> {
        Err(Rejected::new(HalError::NotSupported, buf))
    }

    fn rx_disable(&mut self) -> HalResult<()> {
        Err(HalError::NotSupported)
    }
}
