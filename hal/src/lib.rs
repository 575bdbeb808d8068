//! Hardware Abstraction Layer (HAL) for UART drivers
//!
//! This crate provides the vendor-agnostic contracts a UART driver exposes to
//! client code. A driver may implement any of the three surfaces:
//!
//! - [`UartPoll`]  – blocking single-byte I/O.
//! - [`UartAsync`] – buffered transfers reported through an event callback.
//! - [`UartIrq`]   – single-byte FIFOs with level-triggered notifications.
//!
//! A client selects exactly one of them at a time.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod error;
pub mod uart;

// Re-export commonly used types
pub use error::{HalError, HalResult};
pub use uart::{
    AsyncCallback, Direction, IrqCallback, Rejected, UartAsync, UartEvent, UartIrq, UartPoll,
};
