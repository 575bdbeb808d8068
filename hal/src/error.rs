//! Common error types for UART operations

use core::fmt;

/// UART operation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalError {
    /// Invalid parameter provided
    InvalidParameter,
    /// Operation deliberately not supported by this implementation
    NotSupported,
    /// Query that this implementation cannot answer
    NotImplemented,
    /// A transfer is already in flight on this direction
    AlreadyInProgress,
    /// The peer on the other end of the transport is gone
    Disconnected,
    /// Transport failure, carrying the raw OS error code (0 if unknown)
    Transport(i32),
}

impl fmt::Display for HalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidParameter => write!(f, "invalid parameter"),
            Self::NotSupported => write!(f, "operation not supported"),
            Self::NotImplemented => write!(f, "operation not implemented"),
            Self::AlreadyInProgress => write!(f, "transfer already in progress"),
            Self::Disconnected => write!(f, "transport peer disconnected"),
            Self::Transport(code) => write!(f, "transport error code: {}", code),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for HalError {}

/// Result type for UART operations
pub type HalResult<T> = Result<T, HalError>;
