//! Device configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use uart_hal::Direction;

use crate::error::PipeUartError;

/// Default re-arm delay of the retry timers.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1);
/// Default sleep between blocking send attempts.
pub const DEFAULT_POLL_BACKOFF: Duration = Duration::from_millis(1);
/// Default busy-wait between attempts to open a pipe.
pub const DEFAULT_OPEN_SPIN: Duration = Duration::from_micros(1);

/// Configuration for a pipe-backed UART.
///
/// The two paths are fixed at construction; everything else has a default
/// suitable for interactive use.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipeUartConfig {
    /// FIFO carrying host → device bytes.
    pub rx_path: PathBuf,
    /// FIFO carrying device → host bytes.
    pub tx_path: PathBuf,
    pub retry_delay: Duration,
    pub poll_backoff: Duration,
    pub open_spin: Duration,
    /// Bound on the wait for a peer at open time. `None` waits forever.
    pub connect_timeout: Option<Duration>,
}

impl PipeUartConfig {
    /// Creates a new configuration builder for the given FIFO pair.
    pub fn builder(rx_path: impl Into<PathBuf>, tx_path: impl Into<PathBuf>) -> PipeUartConfigBuilder {
        PipeUartConfigBuilder::new(rx_path.into(), tx_path.into())
    }

    /// Path bound to `direction`.
    pub fn path(&self, direction: Direction) -> &Path {
        match direction {
            Direction::Inbound => &self.rx_path,
            Direction::Outbound => &self.tx_path,
        }
    }
}

/// Builder for ergonomic configuration construction.
#[derive(Debug, Clone)]
pub struct PipeUartConfigBuilder {
    config: PipeUartConfig,
}

impl PipeUartConfigBuilder {
    fn new(rx_path: PathBuf, tx_path: PathBuf) -> Self {
        Self {
            config: PipeUartConfig {
                rx_path,
                tx_path,
                retry_delay: DEFAULT_RETRY_DELAY,
                poll_backoff: DEFAULT_POLL_BACKOFF,
                open_spin: DEFAULT_OPEN_SPIN,
                connect_timeout: None,
            },
        }
    }

    /// Sets the re-arm delay used by both retry timers.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self
    }

    /// Sets the sleep between blocking send attempts.
    pub fn poll_backoff(mut self, backoff: Duration) -> Self {
        self.config.poll_backoff = backoff;
        self
    }

    /// Sets the busy-wait between open attempts.
    pub fn open_spin(mut self, spin: Duration) -> Self {
        self.config.open_spin = spin;
        self
    }

    /// Bounds how long `open` waits for each peer.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    /// Validates and builds the configuration.
    pub fn build(self) -> Result<PipeUartConfig, PipeUartError> {
        let config = self.config;
        if config.rx_path.as_os_str().is_empty() || config.tx_path.as_os_str().is_empty() {
            return Err(PipeUartError::InvalidConfig("pipe paths must not be empty"));
        }
        if config.rx_path == config.tx_path {
            return Err(PipeUartError::InvalidConfig(
                "rx and tx must use distinct pipes",
            ));
        }
        if config.retry_delay.is_zero() {
            return Err(PipeUartError::InvalidConfig("retry delay must be non-zero"));
        }
        Ok(config)
    }
}
