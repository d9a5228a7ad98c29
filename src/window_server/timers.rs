// src/window_server/timers.rs
//! Deadline-ordered timers run by the window-server actor.

use crate::graphics::DrawableId;
use chrono::{NaiveTime, Timelike};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

pub const CLOCK_PERIOD: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    BusyShow { id: DrawableId, generation: u64 },
    InfoHide { generation: u64 },
    ClockTick,
    SpriteTick { slot: u32, generation: u64 },
}

#[derive(Debug)]
struct Entry {
    deadline: Instant,
    seq: u64,
    kind: TimerKind,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Reversed: BinaryHeap is a max-heap, the earliest deadline must pop first.
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Min-heap of pending timers. Timers with equal deadlines fire in arming order.
#[derive(Debug, Default)]
pub struct TimerQueue {
    heap: BinaryHeap<Entry>,
    seq: u64,
}

impl TimerQueue {
    pub fn arm(&mut self, deadline: Instant, kind: TimerKind) {
        self.seq += 1;
        self.heap.push(Entry {
            deadline,
            seq: self.seq,
            kind,
        });
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|e| e.deadline)
    }

    /// Removes and returns every timer due at `now`, earliest first.
    pub fn pop_due(&mut self, now: Instant) -> Vec<TimerKind> {
        let mut due = Vec::new();
        while self.heap.peek().is_some_and(|e| e.deadline <= now) {
            if let Some(entry) = self.heap.pop() {
                due.push(entry.kind);
            }
        }
        due
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }
}

/// Time from `now` to the next wall-clock minute boundary. Exactly on a
/// boundary, the next one is a full minute away.
pub fn delay_to_next_minute(now: NaiveTime) -> Duration {
    let into_minute =
        Duration::from_secs(now.second() as u64) + Duration::from_nanos(now.nanosecond() as u64);
    match CLOCK_PERIOD.checked_sub(into_minute) {
        Some(delay) if !delay.is_zero() => delay,
        _ => CLOCK_PERIOD,
    }
}

/// A tick that fires this close before a minute boundary, because the
/// monotonic and wall clocks drifted apart, belongs to that boundary.
const EARLY_TICK_SLACK: Duration = Duration::from_secs(1);

/// Delay from a clock tick fired at wall time `now` to the next one. Ticks
/// stay on minute boundaries however late or early the previous one fired.
pub fn delay_to_next_tick(now: NaiveTime) -> Duration {
    let delay = delay_to_next_minute(now);
    if delay < EARLY_TICK_SLACK {
        delay + CLOCK_PERIOD
    } else {
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_deadline_order() {
        let t0 = Instant::now();
        let mut q = TimerQueue::default();
        q.arm(t0 + Duration::from_millis(30), TimerKind::ClockTick);
        q.arm(t0 + Duration::from_millis(10), TimerKind::InfoHide { generation: 1 });
        q.arm(
            t0 + Duration::from_millis(20),
            TimerKind::SpriteTick {
                slot: 1,
                generation: 1,
            },
        );

        assert_eq!(q.next_deadline(), Some(t0 + Duration::from_millis(10)));
        assert!(q.pop_due(t0).is_empty());
        assert_eq!(
            q.pop_due(t0 + Duration::from_millis(25)),
            vec![
                TimerKind::InfoHide { generation: 1 },
                TimerKind::SpriteTick {
                    slot: 1,
                    generation: 1
                }
            ]
        );
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn equal_deadlines_fire_in_arming_order() {
        let t0 = Instant::now();
        let mut q = TimerQueue::default();
        q.arm(t0, TimerKind::InfoHide { generation: 1 });
        q.arm(t0, TimerKind::InfoHide { generation: 2 });
        assert_eq!(
            q.pop_due(t0),
            vec![
                TimerKind::InfoHide { generation: 1 },
                TimerKind::InfoHide { generation: 2 }
            ]
        );
    }

    #[test]
    fn clock_aligns_to_next_minute() {
        let t = NaiveTime::from_hms_milli_opt(10, 15, 42, 500).unwrap();
        assert_eq!(delay_to_next_minute(t), Duration::from_millis(17_500));

        let on_boundary = NaiveTime::from_hms_opt(10, 16, 0).unwrap();
        assert_eq!(delay_to_next_minute(on_boundary), CLOCK_PERIOD);

        let last_instant = NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999).unwrap();
        assert_eq!(delay_to_next_minute(last_instant), Duration::from_nanos(1));
    }

    #[test]
    fn late_and_early_ticks_return_to_the_boundary() {
        let late = NaiveTime::from_hms_milli_opt(10, 16, 0, 700).unwrap();
        assert_eq!(delay_to_next_tick(late), Duration::from_millis(59_300));

        let early = NaiveTime::from_hms_milli_opt(10, 16, 59, 900).unwrap();
        assert_eq!(delay_to_next_tick(early), Duration::from_millis(60_100));

        let exact = NaiveTime::from_hms_opt(10, 17, 0).unwrap();
        assert_eq!(delay_to_next_tick(exact), CLOCK_PERIOD);
    }
}
