//! One-shot software timers standing in for hardware interrupts.
//!
//! The wheel keeps at most one deadline per [`TimerId`]. Re-arming a timer
//! replaces its deadline, and a timer disarms itself as it fires, matching
//! the behaviour of restarting a one-shot kernel timer.

use std::fmt;
use std::time::Duration;

use log::trace;
use uart_hal::Direction;

/// Identifies which software timer fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimerId {
    /// Shared retry timer of the asynchronous transfer engine.
    AsyncRetry,
    /// Per-direction expiry of an asynchronous transfer.
    AsyncExpiry(Direction),
    /// Retry timer of the interrupt emulation layer.
    IrqRetry,
}

impl TimerId {
    pub const ALL: [TimerId; 4] = [
        TimerId::AsyncRetry,
        TimerId::AsyncExpiry(Direction::Inbound),
        TimerId::AsyncExpiry(Direction::Outbound),
        TimerId::IrqRetry,
    ];

    const fn slot(self) -> usize {
        match self {
            Self::AsyncRetry => 0,
            Self::AsyncExpiry(Direction::Inbound) => 1,
            Self::AsyncExpiry(Direction::Outbound) => 2,
            Self::IrqRetry => 3,
        }
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AsyncRetry => write!(f, "async-retry"),
            Self::AsyncExpiry(direction) => write!(f, "async-expiry-{direction}"),
            Self::IrqRetry => write!(f, "irq-retry"),
        }
    }
}

/// Deadline table for the device's timers.
#[derive(Debug, Default)]
pub struct TimerWheel {
    deadlines: [Option<Duration>; 4],
    fired: [u64; 4],
}

impl TimerWheel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms `id` to fire at `deadline`, replacing any earlier arming.
    pub fn arm(&mut self, id: TimerId, deadline: Duration) {
        trace!("arm {id} at {deadline:?}");
        self.deadlines[id.slot()] = Some(deadline);
    }

    /// Arms `id` unless it is already due at or before `deadline`.
    pub fn arm_no_later(&mut self, id: TimerId, deadline: Duration) {
        match self.deadlines[id.slot()] {
            Some(current) if current <= deadline => {}
            _ => self.arm(id, deadline),
        }
    }

    /// Stops `id`. Returns whether it was armed.
    pub fn disarm(&mut self, id: TimerId) -> bool {
        let was_armed = self.deadlines[id.slot()].take().is_some();
        if was_armed {
            trace!("disarm {id}");
        }
        was_armed
    }

    pub fn is_armed(&self, id: TimerId) -> bool {
        self.deadlines[id.slot()].is_some()
    }

    pub fn deadline(&self, id: TimerId) -> Option<Duration> {
        self.deadlines[id.slot()]
    }

    /// Earliest deadline across all armed timers.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.deadlines.iter().flatten().min().copied()
    }

    /// Disarms and returns the earliest timer due at `now`.
    ///
    /// Timers sharing a deadline fire in [`TimerId`] order.
    pub fn pop_expired(&mut self, now: Duration) -> Option<TimerId> {
        let id = TimerId::ALL
            .into_iter()
            .filter_map(|id| self.deadline(id).map(|deadline| (deadline, id)))
            .filter(|(deadline, _)| *deadline <= now)
            .min()
            .map(|(_, id)| id)?;

        self.deadlines[id.slot()] = None;
        self.fired[id.slot()] += 1;
        Some(id)
    }

    /// How many times `id` has fired since the wheel was created.
    pub fn fired_count(&self, id: TimerId) -> u64 {
        self.fired[id.slot()]
    }

    pub fn disarm_all(&mut self) {
        self.deadlines = [None; 4];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn fires_once_when_due() {
        let mut wheel = TimerWheel::new();
        wheel.arm(TimerId::IrqRetry, ms(5));

        assert_eq!(wheel.pop_expired(ms(4)), None);
        assert_eq!(wheel.pop_expired(ms(5)), Some(TimerId::IrqRetry));
        assert_eq!(wheel.pop_expired(ms(6)), None);
        assert!(!wheel.is_armed(TimerId::IrqRetry));
        assert_eq!(wheel.fired_count(TimerId::IrqRetry), 1);
    }

    #[test]
    fn rearm_replaces_deadline() {
        let mut wheel = TimerWheel::new();
        wheel.arm(TimerId::AsyncRetry, ms(1));
        wheel.arm(TimerId::AsyncRetry, ms(10));

        assert_eq!(wheel.pop_expired(ms(5)), None);
        assert_eq!(wheel.deadline(TimerId::AsyncRetry), Some(ms(10)));
    }

    #[test]
    fn arm_no_later_keeps_earlier_deadline() {
        let mut wheel = TimerWheel::new();
        wheel.arm(TimerId::AsyncRetry, ms(1));
        wheel.arm_no_later(TimerId::AsyncRetry, ms(3));
        assert_eq!(wheel.deadline(TimerId::AsyncRetry), Some(ms(1)));

        wheel.arm_no_later(TimerId::AsyncRetry, ms(0));
        assert_eq!(wheel.deadline(TimerId::AsyncRetry), Some(ms(0)));
    }

    #[test]
    fn earliest_deadline_fires_first() {
        let mut wheel = TimerWheel::new();
        wheel.arm(TimerId::AsyncExpiry(Direction::Outbound), ms(2));
        wheel.arm(TimerId::AsyncRetry, ms(3));
        wheel.arm(TimerId::AsyncExpiry(Direction::Inbound), ms(3));

        assert_eq!(wheel.next_deadline(), Some(ms(2)));
        assert_eq!(
            wheel.pop_expired(ms(3)),
            Some(TimerId::AsyncExpiry(Direction::Outbound))
        );
        // ties resolve in tag order
        assert_eq!(wheel.pop_expired(ms(3)), Some(TimerId::AsyncRetry));
        assert_eq!(
            wheel.pop_expired(ms(3)),
            Some(TimerId::AsyncExpiry(Direction::Inbound))
        );
        assert_eq!(wheel.next_deadline(), None);
    }

    #[test]
    fn disarm_reports_previous_state() {
        let mut wheel = TimerWheel::new();
        assert!(!wheel.disarm(TimerId::IrqRetry));
        wheel.arm(TimerId::IrqRetry, ms(1));
        assert!(wheel.disarm(TimerId::IrqRetry));
        assert_eq!(wheel.pop_expired(ms(10)), None);
    }
}
