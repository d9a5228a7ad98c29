// src/producers/timer.rs
//! One-shot timers for sleep-interval and sleep-deadline requests.
//!
//! Each armed timer owns a small thread that waits on a condition-variable
//! stop signal until its deadline. Firing completes the request through its
//! `Completer`; the cancel hook only raises the stop signal, so a timer that
//! fires while being cancelled still completes at most once.

use crate::scheduler::{CancelHook, Completer, Response};
use log::*;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

/// Waiting side of a stop signal.
#[derive(Clone)]
struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

/// Triggering side of a stop signal.
struct StopTrigger {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    fn new() -> (Self, StopTrigger) {
        let inner = Arc::new((Mutex::new(false), Condvar::new()));
        (
            StopSignal {
                inner: Arc::clone(&inner),
            },
            StopTrigger { inner },
        )
    }

    /// Blocks until `deadline` or until stopped. Returns true if stopped.
    fn wait_until(&self, deadline: Instant) -> bool {
        let (lock, cvar) = &*self.inner;
        let mut stopped = lock.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if *stopped {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            let (guard, _) = cvar
                .wait_timeout(stopped, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            stopped = guard;
        }
    }
}

impl StopTrigger {
    fn stop(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
    }
}

/// Furthest ahead any timer is armed. Longer delays wait this long instead.
pub const MAX_TIMER_DELAY: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// `now + delay`, with delays beyond `MAX_TIMER_DELAY` (or beyond what
/// `Instant` can represent) pushed back to the furthest representable point.
pub fn deadline_after(now: Instant, delay: Duration) -> Instant {
    let mut delay = delay.min(MAX_TIMER_DELAY);
    loop {
        if let Some(deadline) = now.checked_add(delay) {
            return deadline;
        }
        if delay.is_zero() {
            return now;
        }
        delay /= 2;
    }
}

/// Completes the request after `interval`.
pub fn sleep_for(completer: Completer, interval: Duration) -> CancelHook {
    arm(completer, deadline_after(Instant::now(), interval))
}

/// Completes the request at the wall-clock time `deadline`. Deadlines in the
/// past complete immediately.
pub fn sleep_until(completer: Completer, deadline: SystemTime) -> CancelHook {
    let delay = deadline
        .duration_since(SystemTime::now())
        .unwrap_or(Duration::ZERO);
    arm(completer, deadline_after(Instant::now(), delay))
}

fn arm(completer: Completer, deadline: Instant) -> CancelHook {
    let handle = completer.handle();
    let completer = Arc::new(completer);
    let (signal, trigger) = StopSignal::new();

    let timer_completer = Arc::clone(&completer);
    let spawned = thread::Builder::new()
        .name(format!("opl-timer-{}", handle.value()))
        .spawn(move || {
            if signal.wait_until(deadline) {
                trace!("Timer: {} stopped before firing", handle);
                return;
            }
            trace!("Timer: {} fired", handle);
            timer_completer.complete(Response::Completed);
        });

    match spawned {
        Ok(_) => Box::new(move || trigger.stop()),
        Err(e) => {
            warn!("Timer: failed to spawn timer thread for {}: {}", handle, e);
            completer.complete(Response::Completed);
            Box::new(|| {})
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{RequestKind, Scheduler};

    #[test]
    fn deadline_fires_before_longer_interval() {
        let scheduler = Scheduler::new();
        let long = scheduler
            .add_pending_request(RequestKind::Sleep, |c| sleep_for(c, Duration::from_millis(100)))
            .unwrap();
        let short = scheduler
            .add_pending_request(RequestKind::SleepUntil, |c| {
                sleep_until(c, SystemTime::now() + Duration::from_millis(50))
            })
            .unwrap();

        assert_eq!(scheduler.wait_for_any(), (short, Response::Completed));
        assert_eq!(scheduler.wait_for_any(), (long, Response::Completed));
    }

    #[test]
    fn past_deadline_completes_immediately() {
        let scheduler = Scheduler::new();
        let handle = scheduler
            .add_pending_request(RequestKind::SleepUntil, |c| {
                sleep_until(c, SystemTime::now() - Duration::from_secs(5))
            })
            .unwrap();
        assert_eq!(
            scheduler.wait_for_any_timeout(Duration::from_secs(2)),
            Some((handle, Response::Completed))
        );
    }

    #[test]
    fn cancelled_timer_never_fires() {
        let scheduler = Scheduler::new();
        let handle = scheduler
            .add_pending_request(RequestKind::Sleep, |c| sleep_for(c, Duration::from_millis(30)))
            .unwrap();
        scheduler.cancel_request(handle);
        assert_eq!(scheduler.wait_for_any(), (handle, Response::Cancelled));

        thread::sleep(Duration::from_millis(80));
        assert_eq!(scheduler.any_request(), None);
    }

    #[test]
    fn endless_sleep_stays_pending_until_cancelled() {
        let scheduler = Scheduler::new();
        let handle = scheduler
            .add_pending_request(RequestKind::Sleep, |c| sleep_for(c, Duration::MAX))
            .unwrap();
        assert_eq!(scheduler.wait_for_any_timeout(Duration::from_millis(30)), None);
        scheduler.cancel_request(handle);
        assert_eq!(scheduler.wait_for_any(), (handle, Response::Cancelled));
    }

    #[test]
    fn far_deadlines_are_capped_not_overflowed() {
        let now = Instant::now();
        assert_eq!(deadline_after(now, Duration::MAX), now + MAX_TIMER_DELAY);
        assert_eq!(
            deadline_after(now, Duration::from_millis(5)),
            now + Duration::from_millis(5)
        );
    }

    #[test]
    fn stop_signal_wakes_waiter_early() {
        let (signal, trigger) = StopSignal::new();
        let started = Instant::now();
        let waiter = thread::spawn(move || signal.wait_until(Instant::now() + Duration::from_secs(10)));
        thread::sleep(Duration::from_millis(10));
        trigger.stop();
        assert!(waiter.join().unwrap());
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
