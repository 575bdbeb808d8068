//! UART (Universal Asynchronous Receiver/Transmitter) driver contracts

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;
use core::time::Duration;

use crate::error::{HalError, HalResult};

/// One half of a UART.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Direction {
    /// Host → device (the receive side, `rx`).
    Inbound,
    /// Device → host (the transmit side, `tx`).
    Outbound,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Inbound, Direction::Outbound];

    /// Short label used in logs and command-line option names.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Inbound => "rx",
            Self::Outbound => "tx",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Events delivered to the asynchronous callback.
///
/// Transmit completion is a single event. Receive completion (or expiry) is
/// always reported as the ordered sequence `RxReady`, `RxBufReleased`,
/// `RxDisabled`.
#[derive(Debug, PartialEq, Eq)]
pub enum UartEvent<'a> {
    /// Every byte of the transmit buffer has been written.
    TxDone { buf: Vec<u8>, len: usize },
    /// The transmit timeout elapsed first; the buffer is handed back.
    TxAborted { buf: Vec<u8> },
    /// Received data. Empty when the receive timed out.
    RxReady { data: &'a [u8] },
    /// The receive buffer is no longer used by the driver.
    RxBufReleased { buf: Vec<u8> },
    /// Reception stopped; a new buffer must be supplied to continue.
    RxDisabled,
}

/// A start request the driver refused, with the caller's buffer returned.
#[derive(Debug, PartialEq, Eq)]
pub struct Rejected {
    pub error: HalError,
    pub buf: Vec<u8>,
}

impl Rejected {
    pub fn new(error: HalError, buf: Vec<u8>) -> Self {
        Self { error, buf }
    }
}

impl fmt::Display for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} byte buffer returned)", self.error, self.buf.len())
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Rejected {}

/// Asynchronous event callback. The driver passes itself back in so the
/// callback can start the next transfer.
pub type AsyncCallback<D> = Box<dyn for<'a> FnMut(&mut D, UartEvent<'a>) + Send>;

/// Interrupt callback, invoked while a TX or RX condition is asserted.
pub type IrqCallback<D> = Box<dyn FnMut(&mut D) + Send>;

/// Polled (blocking) UART
pub trait UartPoll {
    /// Send one byte, retrying until the transport accepts it.
    ///
    /// Only fails when the transport itself is broken.
    fn send_byte(&mut self, byte: u8) -> HalResult<()>;

    /// Single non-blocking receive attempt.
    fn receive_byte(&mut self) -> nb::Result<u8, HalError>;
}

/// Buffered UART with completion callbacks and timeouts
pub trait UartAsync: Sized {
    /// Install the event callback.
    fn register_callback(&mut self, callback: AsyncCallback<Self>);

    /// Start a transfer on `direction`. `None` waits forever.
    fn start_transfer(
        &mut self,
        direction: Direction,
        buf: Vec<u8>,
        timeout: Option<Duration>,
    ) -> Result<(), Rejected>;

    /// Start transmitting `buf`.
    fn tx(&mut self, buf: Vec<u8>, timeout: Option<Duration>) -> Result<(), Rejected> {
        self.start_transfer(Direction::Outbound, buf, timeout)
    }

    /// Start receiving into `buf`.
    fn rx_enable(&mut self, buf: Vec<u8>, timeout: Option<Duration>) -> Result<(), Rejected> {
        self.start_transfer(Direction::Inbound, buf, timeout)
    }

    /// Abort the transmit in flight.
    fn tx_abort(&mut self) -> HalResult<()>;

    /// Provide the next receive buffer while one is in use.
    fn rx_buf_rsp(&mut self, buf: Vec<u8>) -> Result<(), Rejected>;

    /// Stop reception in flight.
    fn rx_disable(&mut self) -> HalResult<()>;
}

/// Interrupt-driven UART with single-byte FIFOs
pub trait UartIrq: Sized {
    /// Install the interrupt callback.
    fn register_irq_callback(&mut self, callback: IrqCallback<Self>);

    /// Queue bytes for transmission. Returns how many were accepted.
    fn fifo_fill(&mut self, data: &[u8]) -> usize;

    /// Take received bytes. Returns how many were copied into `buf`.
    fn fifo_read(&mut self, buf: &mut [u8]) -> usize;

    fn irq_tx_enable(&mut self);
    fn irq_tx_disable(&mut self);
    fn irq_tx_ready(&self) -> bool;

    /// Whether the last byte has fully left the transmitter.
    fn irq_tx_complete(&self) -> HalResult<bool>;

    fn irq_rx_enable(&mut self);
    fn irq_rx_disable(&mut self);
    fn irq_rx_ready(&self) -> bool;

    fn irq_err_enable(&mut self);
    fn irq_err_disable(&mut self);

    /// True while any enabled condition is asserted.
    fn irq_is_pending(&self) -> bool;

    /// Latch interrupt state at the start of a callback.
    fn irq_update(&mut self) -> bool;
}
