use std::sync::{Arc, Mutex};
use std::time::Duration;

use uart_hal::{UartAsync, UartEvent};

use crate::clock::ManualClock;
use crate::config::PipeUartConfig;
use crate::device::PipeUart;
use crate::mock::ScriptedPipe;

mod async_engine;

pub(crate) type TestUart = PipeUart<ScriptedPipe>;

pub(crate) const fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

/// A device over scripted pipes, plus the peer ends of both pipes.
pub(crate) struct Harness {
    pub uart: TestUart,
    pub rx: ScriptedPipe,
    pub tx: ScriptedPipe,
    pub clock: ManualClock,
}

impl Harness {
    pub fn new() -> Self {
        let config = PipeUartConfig::builder("uart.h2c", "uart.c2h")
            .retry_delay(ms(1))
            .poll_backoff(Duration::from_micros(10))
            .build()
            .expect("valid config");
        let rx = ScriptedPipe::new();
        let tx = ScriptedPipe::new();
        let clock = ManualClock::new();
        let uart = PipeUart::with_transport(config, rx.clone(), tx.clone(), Arc::new(clock.clone()));
        Self { uart, rx, tx, clock }
    }

    /// Moves the clock to `at` and fires everything due.
    pub fn dispatch_at(&mut self, at: Duration) -> usize {
        self.clock.set(at);
        self.uart.dispatch()
    }
}

/// Owned copy of a [`UartEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Recorded {
    TxDone(Vec<u8>, usize),
    TxAborted(Vec<u8>),
    RxReady(Vec<u8>),
    RxBufReleased(Vec<u8>),
    RxDisabled,
}

impl From<UartEvent<'_>> for Recorded {
    fn from(event: UartEvent<'_>) -> Self {
        match event {
            UartEvent::TxDone { buf, len } => Self::TxDone(buf, len),
            UartEvent::TxAborted { buf } => Self::TxAborted(buf),
            UartEvent::RxReady { data } => Self::RxReady(data.to_vec()),
            UartEvent::RxBufReleased { buf } => Self::RxBufReleased(buf),
            UartEvent::RxDisabled => Self::RxDisabled,
        }
    }
}

/// Registers an async callback that records every event.
pub(crate) fn record_async(uart: &mut TestUart) -> Arc<Mutex<Vec<Recorded>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    uart.register_callback(Box::new(move |_uart: &mut TestUart, event: UartEvent<'_>| {
        sink.lock().unwrap().push(Recorded::from(event));
    }));
    log
}
