// src/scheduler/mod.rs
//! Request scheduler: correlates asynchronous requests with their completions.
//!
//! The interpreter thread registers requests and blocks in `wait_for_any`;
//! completion producers (timer threads, the sound worker, input delivery)
//! call `complete` from their own threads. A single mutex and condition
//! variable guard the tracked-request table.
//!
//! Every request carries an "armed" flag shared with the `Completer` handed
//! to its producer. Whoever clears the flag first (the producer completing,
//! or `cancel_request`) owns the single completion, so a producer racing a
//! cancellation can never complete a request twice.

mod request;

pub use request::{KeyEvent, PenEvent, RequestHandle, RequestKind, Response, Timestamp};

use log::*;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Stops whatever a producer armed for a request. Runs at most once, only
/// when the request is cancelled before its producer completed it.
pub type CancelHook = Box<dyn FnOnce() + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("{requested:?} rejected: {outstanding:?} {handle} is still outstanding")]
    ConsumerBusy {
        requested: RequestKind,
        outstanding: RequestKind,
        handle: RequestHandle,
    },
}

/// A producer's right to complete one request, exactly once.
pub struct Completer {
    handle: RequestHandle,
    scheduler: Weak<Scheduler>,
    armed: Arc<AtomicBool>,
}

impl Completer {
    pub fn handle(&self) -> RequestHandle {
        self.handle
    }

    /// False once the request was completed or cancelled.
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Completes the request. Returns false, and does nothing, when the
    /// request was already cancelled or completed.
    pub fn complete(&self, response: Response) -> bool {
        if !self.armed.swap(false, Ordering::AcqRel) {
            trace!("Completer: {} already settled, dropping {:?}", self.handle, response);
            return false;
        }
        match self.scheduler.upgrade() {
            Some(scheduler) => {
                scheduler.complete(self.handle, response);
                true
            }
            None => {
                debug!("Completer: scheduler gone, dropping completion of {}", self.handle);
                false
            }
        }
    }
}

impl std::fmt::Debug for Completer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completer")
            .field("handle", &self.handle)
            .field("armed", &self.is_armed())
            .finish()
    }
}

struct TrackedRequest {
    kind: RequestKind,
    response: Option<Response>,
    armed: Arc<AtomicBool>,
    cancel: Option<CancelHook>,
}

struct SchedulerState {
    next_handle: u32,
    requests: HashMap<RequestHandle, TrackedRequest>,
    /// Completed handles in the order they became ready.
    ready: VecDeque<RequestHandle>,
}

impl SchedulerState {
    fn allocate_handle(&mut self) -> RequestHandle {
        loop {
            let handle = RequestHandle(self.next_handle);
            self.next_handle = self.next_handle.wrapping_add(1).max(1);
            if !self.requests.contains_key(&handle) {
                return handle;
            }
        }
    }

    fn outstanding_consumer(&self) -> Option<(RequestHandle, RequestKind)> {
        self.requests
            .iter()
            .find(|(_, r)| r.kind.is_input_consumer() && r.response.is_none())
            .map(|(h, r)| (*h, r.kind))
    }

    fn take_ready(&mut self) -> Option<(RequestHandle, Response)> {
        while let Some(handle) = self.ready.pop_front() {
            match self.requests.remove(&handle) {
                Some(TrackedRequest {
                    response: Some(response),
                    ..
                }) => return Some((handle, response)),
                other => {
                    error!(
                        "Scheduler: ready queue held {} without a response (tracked: {})",
                        handle,
                        other.is_some()
                    );
                    debug_assert!(false, "ready queue held {handle} without a response");
                }
            }
        }
        None
    }
}

pub struct Scheduler {
    state: Mutex<SchedulerState>,
    ready: Condvar,
}

impl Scheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Scheduler {
            state: Mutex::new(SchedulerState {
                next_handle: 1,
                requests: HashMap::new(),
                ready: VecDeque::new(),
            }),
            ready: Condvar::new(),
        })
    }

    // Every mutation is a single insert or remove, so a poisoned table is still usable.
    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a request and starts its producer.
    ///
    /// `start` receives the request's `Completer` and returns the hook that
    /// stops the producer on cancellation. It runs without the scheduler lock
    /// held and may complete the request synchronously.
    pub fn add_pending_request<F>(
        self: &Arc<Self>,
        kind: RequestKind,
        start: F,
    ) -> Result<RequestHandle, SchedulerError>
    where
        F: FnOnce(Completer) -> CancelHook,
    {
        let armed = Arc::new(AtomicBool::new(true));
        let handle = {
            let mut state = self.lock();
            if kind.is_input_consumer() {
                if let Some((handle, outstanding)) = state.outstanding_consumer() {
                    let err = SchedulerError::ConsumerBusy {
                        requested: kind,
                        outstanding,
                        handle,
                    };
                    error!("Scheduler: {}", err);
                    return Err(err);
                }
            }
            let handle = state.allocate_handle();
            state.requests.insert(
                handle,
                TrackedRequest {
                    kind,
                    response: None,
                    armed: Arc::clone(&armed),
                    cancel: None,
                },
            );
            handle
        };
        debug!("Scheduler: added {} ({:?})", handle, kind);

        let hook = start(Completer {
            handle,
            scheduler: Arc::downgrade(self),
            armed,
        });

        let mut state = self.lock();
        match state.requests.get_mut(&handle) {
            Some(request) if request.response.is_none() => request.cancel = Some(hook),
            _ => trace!("Scheduler: {} completed while starting", handle),
        }
        Ok(handle)
    }

    /// Writes the response of a pending request and wakes one waiter.
    ///
    /// Completing an untracked or already completed handle is a programmer
    /// error: it asserts in debug builds and is logged and ignored otherwise.
    pub fn complete(&self, handle: RequestHandle, response: Response) {
        let hook = {
            let mut state = self.lock();
            let Some(request) = state.requests.get_mut(&handle) else {
                error!("Scheduler: complete({}) for an untracked handle", handle);
                debug_assert!(false, "complete() called for untracked {handle}");
                return;
            };
            if let Some(existing) = &request.response {
                error!(
                    "Scheduler: {} completed twice (had {:?}, got {:?})",
                    handle, existing, response
                );
                debug_assert!(false, "{handle} completed twice");
                return;
            }
            trace!("Scheduler: {} -> {:?}", handle, response);
            request.armed.store(false, Ordering::Release);
            request.response = Some(response);
            let hook = request.cancel.take();
            state.ready.push_back(handle);
            self.ready.notify_one();
            hook
        };
        drop(hook);
    }

    /// Cancels a pending request. Unknown and already completed handles are
    /// ignored.
    pub fn cancel_request(&self, handle: RequestHandle) {
        let hook = {
            let mut state = self.lock();
            let Some(request) = state.requests.get_mut(&handle) else {
                debug!("Scheduler: cancel({}) ignored, not tracked", handle);
                return;
            };
            if request.response.is_some() {
                debug!("Scheduler: cancel({}) ignored, already complete", handle);
                return;
            }
            if !request.armed.swap(false, Ordering::AcqRel) {
                // The producer cleared the flag first and is about to complete.
                debug!("Scheduler: cancel({}) lost the race with its producer", handle);
                return;
            }
            request.response = Some(Response::Cancelled);
            let hook = request.cancel.take();
            state.ready.push_back(handle);
            self.ready.notify_one();
            hook
        };
        debug!("Scheduler: cancelled {}", handle);
        if let Some(hook) = hook {
            hook();
        }
    }

    /// Blocks until a request has completed, then removes and returns it.
    pub fn wait_for_any(&self) -> (RequestHandle, Response) {
        let mut state = self.lock();
        loop {
            if let Some(done) = state.take_ready() {
                debug!("Scheduler: wait returned {} ({:?})", done.0, done.1);
                return done;
            }
            state = self.ready.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like `wait_for_any`, giving up after `timeout`.
    pub fn wait_for_any_timeout(&self, timeout: Duration) -> Option<(RequestHandle, Response)> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if let Some(done) = state.take_ready() {
                return Some(done);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let (guard, _) = self
                .ready
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }

    /// Non-blocking `wait_for_any`.
    pub fn any_request(&self) -> Option<(RequestHandle, Response)> {
        self.lock().take_ready()
    }

    /// Injects an already completed request carrying `Response::Interrupt`,
    /// waking a blocked `wait_for_any`.
    pub fn interrupt(&self) -> RequestHandle {
        let mut state = self.lock();
        let handle = state.allocate_handle();
        state.requests.insert(
            handle,
            TrackedRequest {
                kind: RequestKind::Interrupt,
                response: Some(Response::Interrupt),
                armed: Arc::new(AtomicBool::new(false)),
                cancel: None,
            },
        );
        state.ready.push_back(handle);
        self.ready.notify_one();
        info!("Scheduler: interrupt injected as {}", handle);
        handle
    }

    /// Handles of requests that have not completed yet.
    pub fn outstanding(&self) -> Vec<RequestHandle> {
        let state = self.lock();
        let mut handles: Vec<_> = state
            .requests
            .iter()
            .filter(|(_, r)| r.response.is_none())
            .map(|(h, _)| *h)
            .collect();
        handles.sort();
        handles
    }

    pub fn pending_count(&self) -> usize {
        self.lock()
            .requests
            .values()
            .filter(|r| r.response.is_none())
            .count()
    }

    /// True while the handle is tracked, i.e. until its completion is consumed.
    pub fn is_tracked(&self, handle: RequestHandle) -> bool {
        self.lock().requests.contains_key(&handle)
    }
}

/// A cancel hook with nothing to stop, for requests completed by an
/// external producer.
pub fn no_cancel() -> CancelHook {
    Box::new(|| {})
}
