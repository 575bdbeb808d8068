//! Host scheduler that delivers timer callbacks in real time.
//!
//! The runtime owns a device and repeatedly dispatches its due timers, then
//! sleeps until the next deadline. Sleeping is bounded by an idle interval
//! so that a stop request or a timer armed by the caller is noticed quickly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::debug;

use crate::device::PipeUart;
use crate::transport::Transport;

/// Default upper bound on a single sleep.
pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_millis(10);

/// Cloneable handle that asks a running [`Runtime`] to return.
#[derive(Debug, Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        !self.running.load(Ordering::SeqCst)
    }
}

pub struct Runtime<T: Transport> {
    uart: PipeUart<T>,
    idle: Duration,
    running: Arc<AtomicBool>,
}

impl<T: Transport> Runtime<T> {
    pub fn new(uart: PipeUart<T>) -> Self {
        Self {
            uart,
            idle: DEFAULT_IDLE_INTERVAL,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Sets the longest time a step may sleep.
    pub fn with_idle_interval(mut self, idle: Duration) -> Self {
        self.idle = idle;
        self
    }

    pub fn uart(&self) -> &PipeUart<T> {
        &self.uart
    }

    pub fn uart_mut(&mut self) -> &mut PipeUart<T> {
        &mut self.uart
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            running: Arc::clone(&self.running),
        }
    }

    pub fn into_inner(self) -> PipeUart<T> {
        self.uart
    }

    /// Dispatches due timers, then sleeps until the next deadline.
    /// Returns the number of timers fired.
    pub fn step(&mut self) -> usize {
        let fired = self.uart.dispatch();
        let wait = match self.uart.next_deadline() {
            Some(deadline) => deadline.saturating_sub(self.uart.now()).min(self.idle),
            None => self.idle,
        };
        if !wait.is_zero() {
            thread::sleep(wait);
        }
        fired
    }

    /// Runs until `done` returns true or the runtime is stopped.
    pub fn run_until<F>(&mut self, mut done: F)
    where
        F: FnMut(&mut PipeUart<T>) -> bool,
    {
        while self.running.load(Ordering::SeqCst) && self.uart.is_open() {
            if done(&mut self.uart) {
                return;
            }
            self.step();
        }
        debug!("runtime stopped");
    }

    /// Runs for roughly `duration`.
    pub fn run_for(&mut self, duration: Duration) {
        let start = Instant::now();
        self.run_until(|_| start.elapsed() >= duration);
    }

    /// Runs until stopped through a [`StopHandle`] or the device closes.
    pub fn run(&mut self) {
        self.run_until(|_| false);
    }
}
