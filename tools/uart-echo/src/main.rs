use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{info, warn};
use pipe_uart::{FifoEndpoint, PipeUart, PipeUartConfig, Runtime};
use uart_hal::{HalError, Rejected, UartAsync, UartEvent, UartIrq, UartPoll};

type Uart = PipeUart<FifoEndpoint>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Blocking byte-at-a-time facade
    Poll,
    /// Buffered transfers with completion events
    Async,
    /// Single-byte FIFOs with interrupt callbacks
    Irq,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Echo every received byte over an emulated pipe UART")]
struct Opts {
    /// FIFO the host writes and the device reads
    #[arg(long = "fifo-rx", default_value = "uart.h2c", value_name = "PATH")]
    fifo_rx: PathBuf,

    /// FIFO the device writes and the host reads
    #[arg(long = "fifo-tx", default_value = "uart.c2h", value_name = "PATH")]
    fifo_tx: PathBuf,

    #[arg(long = "retry-ms", default_value_t = 1, value_name = "MS")]
    retry_ms: u64,

    /// Give up if no peer attaches within this time (default: wait forever)
    #[arg(long = "connect-timeout-ms", value_name = "MS")]
    connect_timeout_ms: Option<u64>,

    #[arg(long, value_enum, default_value_t = Mode::Async)]
    mode: Mode,

    /// Receive buffer size in async mode
    #[arg(long, default_value_t = 1)]
    chunk: usize,
}

impl Opts {
    fn config(&self) -> Result<PipeUartConfig> {
        let mut builder = PipeUartConfig::builder(&self.fifo_rx, &self.fifo_tx)
            .retry_delay(Duration::from_millis(self.retry_ms));
        if let Some(ms) = self.connect_timeout_ms {
            builder = builder.connect_timeout(Duration::from_millis(ms));
        }
        Ok(builder.build()?)
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let opts = Opts::parse();
    let config = opts.config().context("invalid options")?;
    let idle = config.retry_delay;

    info!(
        "waiting for peer on {} and {}",
        config.rx_path.display(),
        config.tx_path.display()
    );
    let uart = PipeUart::open(config).context("failed to open pipe UART")?;

    let mut runtime = Runtime::new(uart).with_idle_interval(idle);
    let stop = runtime.stop_handle();
    ctrlc::set_handler(move || stop.stop()).context("failed to install Ctrl-C handler")?;

    info!("echoing in {:?} mode", opts.mode);
    match opts.mode {
        Mode::Poll => run_poll(&mut runtime)?,
        Mode::Async => run_async(&mut runtime, opts.chunk.max(1))?,
        Mode::Irq => run_irq(&mut runtime),
    }

    runtime.into_inner().close();
    Ok(())
}

fn run_poll(runtime: &mut Runtime<FifoEndpoint>) -> Result<()> {
    let mut failure = None;
    runtime.run_until(|uart| loop {
        match uart.receive_byte() {
            Ok(byte) => {
                if let Err(err) = uart.send_byte(byte) {
                    failure = Some(err);
                    return true;
                }
            }
            Err(nb::Error::WouldBlock) => return false,
            Err(nb::Error::Other(err)) => {
                failure = Some(err);
                return true;
            }
        }
    });

    match failure {
        Some(err) => Err(err).context("poll echo stopped"),
        None => Ok(()),
    }
}

/// Echo state carried by the async callback.
struct AsyncEcho {
    chunk: usize,
    spare: Option<Vec<u8>>,
    backlog: VecDeque<Vec<u8>>,
}

impl AsyncEcho {
    fn handle(&mut self, uart: &mut Uart, event: UartEvent<'_>) {
        match event {
            UartEvent::RxReady { data } if !data.is_empty() => self.send(uart, data.to_vec()),
            UartEvent::RxReady { .. } => {}
            UartEvent::RxBufReleased { buf } => self.spare = Some(buf),
            UartEvent::RxDisabled => self.listen(uart),
            UartEvent::TxDone { .. } | UartEvent::TxAborted { .. } => {
                if let Some(next) = self.backlog.pop_front() {
                    self.send(uart, next);
                }
            }
        }
    }

    fn listen(&mut self, uart: &mut Uart) {
        let buf = self.spare.take().unwrap_or_else(|| vec![0; self.chunk]);
        if let Err(rejected) = uart.rx_enable(buf, None) {
            warn!("cannot restart receive: {rejected}");
        }
    }

    fn send(&mut self, uart: &mut Uart, data: Vec<u8>) {
        match uart.tx(data, None) {
            Ok(()) => {}
            Err(Rejected {
                error: HalError::AlreadyInProgress,
                buf,
            }) => self.backlog.push_back(buf),
            Err(rejected) => warn!("dropping {} bytes: {}", rejected.buf.len(), rejected.error),
        }
    }
}

fn run_async(runtime: &mut Runtime<FifoEndpoint>, chunk: usize) -> Result<()> {
    let mut echo = AsyncEcho {
        chunk,
        spare: None,
        backlog: VecDeque::new(),
    };
    let uart = runtime.uart_mut();
    uart.register_callback(Box::new(move |uart: &mut Uart, event: UartEvent<'_>| {
        echo.handle(uart, event)
    }));
    uart.rx_enable(vec![0; chunk], None)?;

    runtime.run();
    Ok(())
}

fn run_irq(runtime: &mut Runtime<FifoEndpoint>) {
    let mut backlog = VecDeque::new();
    let uart = runtime.uart_mut();
    uart.register_irq_callback(Box::new(move |uart: &mut Uart| {
        let mut byte = [0u8];
        while uart.irq_rx_ready() && uart.fifo_read(&mut byte) == 1 {
            backlog.push_back(byte[0]);
            uart.irq_tx_enable();
        }
        if uart.irq_tx_ready() {
            match backlog.front() {
                Some(&next) => {
                    if uart.fifo_fill(&[next]) == 1 {
                        backlog.pop_front();
                    }
                }
                None => uart.irq_tx_disable(),
            }
        }
    }));
    uart.irq_rx_enable();

    runtime.run();
}
