//! Scripted in-memory transport.
//!
//! A [`ScriptedPipe`] is a byte queue: writes append, reads pop. Clones share
//! the queue, so the same pipe can be handed to a device as its TX side and
//! kept by a test (or another device) as the reading peer. Each I/O attempt
//! may be shaped by a scripted [`Step`]; once the script runs out the pipe
//! moves as many bytes as it can.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::transport::Transport;

/// Outcome of one scripted I/O attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Move at most this many bytes.
    Accept(usize),
    /// Report `WouldBlock`.
    Block,
    /// Fail with an I/O error of this kind.
    Fail(io::ErrorKind),
}

#[derive(Debug)]
struct PipeState {
    queue: VecDeque<u8>,
    script: VecDeque<Step>,
    attempts: usize,
    open: bool,
}

#[derive(Debug, Clone)]
pub struct ScriptedPipe {
    state: Arc<Mutex<PipeState>>,
}

impl Default for ScriptedPipe {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedPipe {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(PipeState {
                queue: VecDeque::new(),
                script: VecDeque::new(),
                attempts: 0,
                open: true,
            })),
        }
    }

    /// Appends bytes as if the peer had written them.
    pub fn feed(&self, bytes: &[u8]) {
        self.state.lock().queue.extend(bytes);
    }

    /// Removes and returns every queued byte, as the reading peer would.
    pub fn drain(&self) -> Vec<u8> {
        self.state.lock().queue.drain(..).collect()
    }

    /// Bytes currently queued.
    pub fn queued(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Appends steps to the script.
    pub fn script(&self, steps: impl IntoIterator<Item = Step>) {
        self.state.lock().script.extend(steps);
    }

    /// Read and write attempts made through this pipe.
    pub fn attempts(&self) -> usize {
        self.state.lock().attempts
    }

    fn next_step(state: &mut PipeState) -> Option<Step> {
        state.attempts += 1;
        state.script.pop_front()
    }
}

impl Transport for ScriptedPipe {
    fn try_read(&mut self, buf: &mut [u8]) -> nb::Result<usize, io::Error> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(nb::Error::Other(io::ErrorKind::NotConnected.into()));
        }
        let limit = match Self::next_step(&mut state) {
            Some(Step::Accept(n)) => n,
            Some(Step::Block) => return Err(nb::Error::WouldBlock),
            Some(Step::Fail(kind)) => return Err(nb::Error::Other(kind.into())),
            None => usize::MAX,
        };
        if state.queue.is_empty() {
            return Err(nb::Error::WouldBlock);
        }

        let n = buf.len().min(limit).min(state.queue.len());
        for (slot, byte) in buf.iter_mut().zip(state.queue.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn try_write(&mut self, buf: &[u8]) -> nb::Result<usize, io::Error> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(nb::Error::Other(io::ErrorKind::NotConnected.into()));
        }
        let limit = match Self::next_step(&mut state) {
            Some(Step::Accept(n)) => n,
            Some(Step::Block) => return Err(nb::Error::WouldBlock),
            Some(Step::Fail(kind)) => return Err(nb::Error::Other(kind.into())),
            None => usize::MAX,
        };

        let n = buf.len().min(limit);
        state.queue.extend(&buf[..n]);
        Ok(n)
    }

    fn close(&mut self) {
        self.state.lock().open = false;
    }

    fn is_open(&self) -> bool {
        self.state.lock().open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_are_read_back_in_order() {
        let mut writer = ScriptedPipe::new();
        let mut reader = writer.clone();

        assert_eq!(writer.try_write(b"abc").unwrap(), 3);
        let mut buf = [0u8; 2];
        assert_eq!(reader.try_read(&mut buf).unwrap(), 2);
        assert_eq!(&buf, b"ab");
        assert_eq!(writer.drain(), b"c");
    }

    #[test]
    fn script_shapes_each_attempt() {
        let mut pipe = ScriptedPipe::new();
        pipe.script([Step::Accept(1), Step::Block, Step::Fail(io::ErrorKind::BrokenPipe)]);

        assert_eq!(pipe.try_write(b"xyz").unwrap(), 1);
        assert!(matches!(pipe.try_write(b"yz"), Err(nb::Error::WouldBlock)));
        assert!(matches!(pipe.try_write(b"yz"), Err(nb::Error::Other(_))));
        assert_eq!(pipe.try_write(b"yz").unwrap(), 2);
        assert_eq!(pipe.attempts(), 4);
        assert_eq!(pipe.drain(), b"xyz");
    }

    #[test]
    fn empty_pipe_would_block() {
        let mut pipe = ScriptedPipe::new();
        let mut buf = [0u8; 4];
        assert!(matches!(pipe.try_read(&mut buf), Err(nb::Error::WouldBlock)));
    }

    #[test]
    fn closed_pipe_reports_not_connected() {
        let mut pipe = ScriptedPipe::new();
        pipe.close();
        pipe.close();
        assert!(!pipe.is_open());
        match pipe.try_write(b"a") {
            Err(nb::Error::Other(err)) => assert_eq!(err.kind(), io::ErrorKind::NotConnected),
            other => panic!("unexpected {other:?}"),
        }
    }
}
