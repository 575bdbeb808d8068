//! Byte-stream endpoints underneath the emulated UART.
//!
//! A [`Transport`] moves bytes in one direction without ever blocking and
//! without any readiness or completion signalling. [`FifoEndpoint`] is the
//! named-pipe implementation used on POSIX hosts.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::{debug, error, info};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use uart_hal::Direction;

use crate::error::PipeUartError;

/// Non-blocking, unbuffered byte stream.
///
/// Both operations either move zero or more bytes or report
/// `nb::Error::WouldBlock`. `Ok(0)` means no progress (for example, no
/// writer is attached to a pipe).
pub trait Transport: Send {
    fn try_read(&mut self, buf: &mut [u8]) -> nb::Result<usize, io::Error>;
    fn try_write(&mut self, buf: &[u8]) -> nb::Result<usize, io::Error>;

    /// Releases the underlying handle. Calling it twice is harmless.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// One end of a named pipe, opened in non-blocking mode.
#[derive(Debug)]
pub struct FifoEndpoint {
    path: PathBuf,
    direction: Direction,
    file: Option<File>,
}

impl FifoEndpoint {
    /// Opens `path` for `direction`, busy-waiting until a peer is attached.
    ///
    /// Opening the write side of a FIFO fails with `ENXIO` until a reader
    /// exists, and the path itself may not exist yet while the peer starts
    /// up. Both are retried; any other failure is returned immediately.
    pub fn open(
        path: &Path,
        direction: Direction,
        spin: Duration,
        connect_timeout: Option<Duration>,
    ) -> Result<Self, PipeUartError> {
        let started = Instant::now();
        let mut options = OpenOptions::new();
        match direction {
            Direction::Inbound => options.read(true),
            Direction::Outbound => options.write(true),
        };
        options.custom_flags(OFlag::O_NONBLOCK.bits());

        loop {
            match options.open(path) {
                Ok(file) => {
                    info!("opened {} pipe {}", direction, path.display());
                    return Ok(Self {
                        path: path.to_path_buf(),
                        direction,
                        file: Some(file),
                    });
                }
                Err(err) if peer_not_ready(&err) => {
                    let waited = started.elapsed();
                    if connect_timeout.is_some_and(|limit| waited >= limit) {
                        error!("no peer on {} after {:?}", path.display(), waited);
                        return Err(PipeUartError::ConnectTimeout {
                            path: path.to_path_buf(),
                            waited,
                        });
                    }
                    busy_wait(spin);
                }
                Err(source) => {
                    error!("failed to open pipe {}: {}", path.display(), source);
                    return Err(PipeUartError::Open {
                        path: path.to_path_buf(),
                        source,
                    });
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    fn file(&mut self) -> nb::Result<&mut File, io::Error> {
        self.file
            .as_mut()
            .ok_or_else(|| nb::Error::Other(io::Error::from(io::ErrorKind::NotConnected)))
    }
}

impl Transport for FifoEndpoint {
    fn try_read(&mut self, buf: &mut [u8]) -> nb::Result<usize, io::Error> {
        let result = self.file()?.read(buf);
        classify(result)
    }

    fn try_write(&mut self, buf: &[u8]) -> nb::Result<usize, io::Error> {
        let result = self.file()?.write(buf);
        classify(result)
    }

    fn close(&mut self) {
        if self.file.take().is_some() {
            debug!("closed {} pipe {}", self.direction, self.path.display());
        }
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }
}

fn classify(result: io::Result<usize>) -> nb::Result<usize, io::Error> {
    match result {
        Ok(n) => Ok(n),
        Err(err)
            if matches!(
                err.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
            ) =>
        {
            Err(nb::Error::WouldBlock)
        }
        Err(err) => Err(nb::Error::Other(err)),
    }
}

fn peer_not_ready(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(code) if code == Errno::ENXIO as i32 || code == Errno::ENOENT as i32
    )
}

/// Spins for `period` without yielding to the OS.
fn busy_wait(period: Duration) {
    let start = Instant::now();
    while start.elapsed() < period {
        std::hint::spin_loop();
    }
}
