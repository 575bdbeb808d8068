use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use uart_hal::HalError;

/// Failures of the device lifecycle.
///
/// `Open` and `ConnectTimeout` are fatal: a UART that cannot reach its
/// transport has no degraded mode, so callers are expected to give up.
#[derive(Debug, Error)]
pub enum PipeUartError {
    #[error("failed to open pipe {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("no peer connected to pipe {} after {waited:?}", path.display())]
    ConnectTimeout { path: PathBuf, waited: Duration },
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Maps a transport failure onto the driver-facing error.
pub(crate) fn hal_error(err: &io::Error) -> HalError {
    match err.kind() {
        io::ErrorKind::BrokenPipe | io::ErrorKind::NotConnected => HalError::Disconnected,
        _ => HalError::Transport(err.raw_os_error().unwrap_or(0)),
    }
}
