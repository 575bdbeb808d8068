//! # pipe-uart
//!
//! An emulated UART peripheral for POSIX hosts. Two named pipes stand in for
//! the wire, one per direction. The pipes never block, never interrupt and
//! never signal completion, so all of that is synthesised in software with
//! one-shot timers and explicit per-transfer state.
//!
//! ## Module Overview
//! - [`device`]    – Device lifecycle, timer dispatch and the blocking facade.
//! - [`async_tx`]  – Buffered transfers with completion events and timeouts.
//! - [`irq`]       – Single-byte FIFOs with level-triggered notifications.
//! - [`timer`]     – Tagged one-shot timers.
//! - [`runtime`]   – Real-time scheduler delivering timer callbacks.
//! - [`transport`] – Non-blocking byte-stream endpoints (named pipes).
//!
//! The driver-facing contracts live in the `uart-hal` crate and are
//! re-exported here.

pub mod async_tx;
pub mod clock;
pub mod config;
pub mod device;
pub mod error;
pub mod irq;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod runtime;
pub mod timer;
pub mod transport;

pub use async_tx::AsyncTransfer;
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{PipeUartConfig, PipeUartConfigBuilder};
pub use device::PipeUart;
pub use error::PipeUartError;
pub use irq::InterruptEndpoint;
pub use runtime::{Runtime, StopHandle};
pub use timer::{TimerId, TimerWheel};
pub use transport::{FifoEndpoint, Transport};
pub use uart_hal::{
    AsyncCallback, Direction, HalError, HalResult, IrqCallback, Rejected, UartAsync, UartEvent,
    UartIrq, UartPoll,
};

#[cfg(test)]
mod tests;
