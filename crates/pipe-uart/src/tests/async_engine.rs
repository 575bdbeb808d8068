use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use uart_hal::{Direction, HalError, Rejected, UartAsync, UartEvent};

use super::{ms, record_async, Harness, Recorded, TestUart};
use crate::clock::ManualClock;
use crate::config::PipeUartConfig;
use crate::device::PipeUart;
use crate::mock::{ScriptedPipe, Step};
use crate::timer::TimerId;

#[test]
fn tx_survives_partial_writes() {
    let mut h = Harness::new();
    let events = record_async(&mut h.uart);
    h.tx.script([Step::Accept(2), Step::Block, Step::Accept(3)]);

    h.uart.tx(b"HELLO".to_vec(), None).unwrap();
    assert!(h.uart.transfer(Direction::Outbound).is_active());

    h.dispatch_at(ms(0));
    assert_eq!(h.uart.transfer(Direction::Outbound).moved(), 2);
    h.dispatch_at(ms(1));
    assert!(events.lock().unwrap().is_empty());
    h.dispatch_at(ms(2));

    assert_eq!(
        *events.lock().unwrap(),
        [Recorded::TxDone(b"HELLO".to_vec(), 5)]
    );
    assert!(h.uart.timers().fired_count(TimerId::AsyncRetry) >= 2);
    assert_eq!(h.tx.drain(), b"HELLO");
    assert!(!h.uart.transfer(Direction::Outbound).is_active());

    // the direction is idle again
    h.uart.tx(b"!".to_vec(), None).unwrap();
    h.dispatch_at(ms(3));
    assert_eq!(h.tx.drain(), b"!");
}

#[test]
fn rx_completes_when_buffer_is_full() {
    let mut h = Harness::new();
    let events = record_async(&mut h.uart);

    h.uart.rx_enable(vec![0; 4], None).unwrap();
    h.rx.feed(b"ab");
    h.dispatch_at(ms(0));
    assert_eq!(h.uart.transfer(Direction::Inbound).moved(), 2);

    h.rx.feed(b"cd");
    h.dispatch_at(ms(1));

    // receive completion is three ordered events, unlike transmit
    assert_eq!(
        *events.lock().unwrap(),
        [
            Recorded::RxReady(b"abcd".to_vec()),
            Recorded::RxBufReleased(b"abcd".to_vec()),
            Recorded::RxDisabled,
        ]
    );
    assert!(!h.uart.transfer(Direction::Inbound).is_active());
}

#[test]
fn rx_timeout_reports_no_data() {
    let mut h = Harness::new();
    let events = record_async(&mut h.uart);

    h.uart.rx_enable(vec![0; 4], Some(ms(5))).unwrap();
    h.rx.feed(b"ab");
    h.dispatch_at(ms(0));
    h.dispatch_at(ms(5));

    assert_eq!(
        *events.lock().unwrap(),
        [
            Recorded::RxReady(Vec::new()),
            Recorded::RxBufReleased(vec![b'a', b'b', 0, 0]),
            Recorded::RxDisabled,
        ]
    );

    // nothing further for the expired transfer
    h.rx.feed(b"cd");
    h.dispatch_at(ms(10));
    assert_eq!(events.lock().unwrap().len(), 3);
    assert_eq!(h.uart.next_deadline(), None);
    assert_eq!(h.rx.queued(), 2);
}

#[test]
fn tx_timeout_aborts_and_returns_buffer() {
    let mut h = Harness::new();
    let events = record_async(&mut h.uart);
    h.tx.script(std::iter::repeat(Step::Block).take(16));

    h.uart.tx(b"xy".to_vec(), Some(ms(3))).unwrap();
    for t in 0..=3 {
        h.dispatch_at(ms(t));
    }

    assert_eq!(*events.lock().unwrap(), [Recorded::TxAborted(b"xy".to_vec())]);
    assert!(!h.uart.transfer(Direction::Outbound).is_active());

    h.dispatch_at(ms(4));
    h.dispatch_at(ms(10));
    assert_eq!(events.lock().unwrap().len(), 1);
    assert_eq!(h.tx.queued(), 0);
}

#[test]
fn second_start_is_rejected_without_disturbing_the_first() {
    let mut h = Harness::new();
    let events = record_async(&mut h.uart);

    h.uart.tx(b"one".to_vec(), None).unwrap();
    let rejected = h.uart.tx(b"two".to_vec(), None).unwrap_err();
    assert_eq!(
        rejected,
        Rejected::new(HalError::AlreadyInProgress, b"two".to_vec())
    );

    h.uart.rx_enable(vec![0; 1], None).unwrap();
    let rejected = h.uart.rx_enable(vec![0; 8], None).unwrap_err();
    assert_eq!(rejected.error, HalError::AlreadyInProgress);
    assert_eq!(rejected.buf.len(), 8);

    h.dispatch_at(ms(0));
    assert_eq!(
        *events.lock().unwrap(),
        [Recorded::TxDone(b"one".to_vec(), 3)]
    );
    assert_eq!(h.tx.drain(), b"one");
    assert_eq!(h.uart.transfer(Direction::Inbound).len(), 1);
}

#[test]
fn completion_stops_the_expiry_timer() {
    let mut h = Harness::new();
    let events = record_async(&mut h.uart);

    h.uart.tx(b"ok".to_vec(), Some(ms(5))).unwrap();
    assert!(h.uart.timers().is_armed(TimerId::AsyncExpiry(Direction::Outbound)));
    h.dispatch_at(ms(0));
    assert!(!h.uart.timers().is_armed(TimerId::AsyncExpiry(Direction::Outbound)));

    h.dispatch_at(ms(5));
    assert_eq!(*events.lock().unwrap(), [Recorded::TxDone(b"ok".to_vec(), 2)]);
}

#[test]
fn both_directions_progress_in_one_firing() {
    let mut h = Harness::new();
    let events = record_async(&mut h.uart);

    h.rx.feed(b"in");
    h.uart.rx_enable(vec![0; 2], None).unwrap();
    h.uart.tx(b"out".to_vec(), None).unwrap();
    h.dispatch_at(ms(0));

    assert_eq!(
        *events.lock().unwrap(),
        [
            Recorded::RxReady(b"in".to_vec()),
            Recorded::RxBufReleased(b"in".to_vec()),
            Recorded::RxDisabled,
            Recorded::TxDone(b"out".to_vec(), 3),
        ]
    );
    assert_eq!(h.uart.timers().fired_count(TimerId::AsyncRetry), 1);
}

#[test]
fn callback_can_start_the_next_transfer() {
    let mut h = Harness::new();
    let mut chunks = VecDeque::from([b"b".to_vec(), b"c".to_vec()]);
    h.uart
        .register_callback(Box::new(move |uart: &mut TestUart, event: UartEvent<'_>| {
            if let UartEvent::TxDone { .. } = event {
                if let Some(next) = chunks.pop_front() {
                    uart.tx(next, None).unwrap();
                }
            }
        }));

    h.uart.tx(b"a".to_vec(), None).unwrap();
    h.dispatch_at(ms(0));

    assert_eq!(h.tx.drain(), b"abc");
    assert!(!h.uart.transfer(Direction::Outbound).is_active());
}

#[test]
fn empty_buffers_are_rejected() {
    let mut h = Harness::new();
    let events = record_async(&mut h.uart);

    let rejected = h.uart.tx(Vec::new(), None).unwrap_err();
    assert_eq!(rejected, Rejected::new(HalError::InvalidParameter, Vec::new()));
    let rejected = h.uart.rx_enable(Vec::new(), Some(ms(1))).unwrap_err();
    assert_eq!(rejected.error, HalError::InvalidParameter);

    assert!(!h.uart.transfer(Direction::Outbound).is_active());
    assert_eq!(h.uart.next_deadline(), None);
    assert_eq!(h.dispatch_at(ms(0)), 0);
    assert!(events.lock().unwrap().is_empty());
}

#[test]
fn unbounded_timeout_never_expires() {
    let mut h = Harness::new();
    let events = record_async(&mut h.uart);
    h.clock.set(ms(1));

    h.uart.tx(b"x".to_vec(), Some(Duration::MAX)).unwrap();
    assert!(!h.uart.timers().is_armed(TimerId::AsyncExpiry(Direction::Outbound)));

    h.dispatch_at(ms(1));
    assert_eq!(*events.lock().unwrap(), [Recorded::TxDone(b"x".to_vec(), 1)]);
    assert_eq!(h.tx.drain(), b"x");
}

#[test]
fn transport_failures_are_retried() {
    let mut h = Harness::new();
    let events = record_async(&mut h.uart);
    h.tx.script([Step::Fail(io::ErrorKind::Other)]);

    h.uart.tx(b"z".to_vec(), None).unwrap();
    h.dispatch_at(ms(0));
    assert!(events.lock().unwrap().is_empty());
    assert_eq!(h.uart.timers().deadline(TimerId::AsyncRetry), Some(ms(1)));

    h.dispatch_at(ms(1));
    assert_eq!(*events.lock().unwrap(), [Recorded::TxDone(b"z".to_vec(), 1)]);
}

#[test]
fn unsupported_operations_are_stable() {
    let mut h = Harness::new();
    h.uart.tx(b"busy".to_vec(), None).unwrap();

    assert_eq!(h.uart.tx_abort(), Err(HalError::NotSupported));
    assert_eq!(h.uart.rx_disable(), Err(HalError::NotSupported));
    let rejected = h.uart.rx_buf_rsp(vec![7; 3]).unwrap_err();
    assert_eq!(rejected, Rejected::new(HalError::NotSupported, vec![7; 3]));

    // the transfer is untouched
    assert!(h.uart.transfer(Direction::Outbound).is_active());
}

#[test]
fn registering_a_callback_resets_transfers() {
    let mut h = Harness::new();
    h.uart.tx(b"stale".to_vec(), Some(ms(5))).unwrap();

    let events = record_async(&mut h.uart);
    assert!(!h.uart.transfer(Direction::Outbound).is_active());
    assert_eq!(h.uart.next_deadline(), None);

    h.dispatch_at(ms(5));
    assert!(events.lock().unwrap().is_empty());
    assert_eq!(h.tx.queued(), 0);
}

#[test]
fn loopback_round_trip_preserves_bytes() {
    let clock = ManualClock::new();
    let link = ScriptedPipe::new();
    let config = PipeUartConfig::builder("a.rx", "a.tx").build().unwrap();

    let mut sender = PipeUart::with_transport(
        config.clone(),
        ScriptedPipe::new(),
        link.clone(),
        Arc::new(clock.clone()),
    );
    let mut receiver = PipeUart::with_transport(
        config,
        link.clone(),
        ScriptedPipe::new(),
        Arc::new(clock.clone()),
    );
    let sent = record_async(&mut sender);
    let received = record_async(&mut receiver);

    let message = b"round trip \x00\xff".to_vec();
    link.script([Step::Accept(4)]);
    receiver.rx_enable(vec![0; message.len()], None).unwrap();
    sender.tx(message.clone(), None).unwrap();

    for t in 0..4 {
        clock.set(ms(t));
        sender.dispatch();
        receiver.dispatch();
    }

    assert_eq!(
        *sent.lock().unwrap(),
        [Recorded::TxDone(message.clone(), message.len())]
    );
    assert_eq!(
        *received.lock().unwrap(),
        [
            Recorded::RxReady(message.clone()),
            Recorded::RxBufReleased(message),
            Recorded::RxDisabled,
        ]
    );
    assert_eq!(link.queued(), 0);
}
