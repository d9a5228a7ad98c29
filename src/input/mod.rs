// src/input/mod.rs
//! Input event queue and its privileged consumers.
//!
//! Host input arrives on whatever thread the host delivers it on and is
//! buffered here until the interpreter asks for it. At most one consumer is
//! installed at a time:
//!
//! - `NextEvent` claims the oldest buffered event.
//! - `NextKeypress` discards buffered events until it finds a key press with
//!   a character code, and keeps waiting if the buffer runs dry.
//!
//! Key-down and key-up events also maintain the set of currently held keys,
//! which the interpreter queries directly.
//!
//! Lock order: the input lock may be held while calling into the scheduler,
//! never the other way round. Scheduler cancellation hooks run after the
//! scheduler lock is released.

use crate::keys::{KeySymbol, Modifiers};
use crate::scheduler::{
    CancelHook, Completer, KeyEvent, PenEvent, RequestHandle, Response, Timestamp,
};
use log::*;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerKind {
    NextEvent,
    NextKeypress,
}

struct Consumer {
    kind: ConsumerKind,
    completer: Completer,
}

#[derive(Default)]
struct InputState {
    buffered: VecDeque<Response>,
    consumer: Option<Consumer>,
    /// Scan codes of the keys currently down.
    held: HashSet<u8>,
}

fn has_charcode(response: &Response) -> bool {
    matches!(response.charcode(), Some(code) if code != 0)
}

impl InputState {
    /// Keys are tracked by scan code, so a key released as a different
    /// symbol than it was pressed as (`a` down, shift, `A` up) still clears.
    fn track_held_keys(&mut self, event: &Response) {
        let (key, down) = match event {
            Response::KeyDown(key) => (key.key, true),
            Response::KeyUp(key) => (key.key, false),
            _ => return,
        };
        let code = key.scancode();
        if code == 0 {
            trace!("InputQueue: {:?} has no scan code, not tracked as held", key);
        } else if down {
            self.held.insert(code);
        } else {
            self.held.remove(&code);
        }
    }

    /// Hands a buffered event to the installed consumer, if one matches.
    fn satisfy_consumer(&mut self) {
        let Some(consumer) = self.consumer.as_ref() else {
            return;
        };
        if !consumer.completer.is_armed() {
            // Cancelled; its hook will find the slot already empty.
            self.consumer = None;
            return;
        }
        let claimed = match consumer.kind {
            ConsumerKind::NextEvent => self.buffered.pop_front(),
            ConsumerKind::NextKeypress => loop {
                match self.buffered.pop_front() {
                    Some(event) if has_charcode(&event) => break Some(event),
                    Some(event) => trace!("InputQueue: keypress consumer discarded {:?}", event),
                    None => break None,
                }
            },
        };
        let Some(event) = claimed else {
            return;
        };
        if let Some(consumer) = self.consumer.take() {
            debug!(
                "InputQueue: {:?} consumer {} claimed {:?}",
                consumer.kind,
                consumer.completer.handle(),
                event
            );
            if !consumer.completer.complete(event.clone()) {
                self.buffered.push_front(event);
            }
        }
    }
}

pub struct InputQueue {
    state: Mutex<InputState>,
    origin: Instant,
}

impl InputQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(InputQueue {
            state: Mutex::new(InputState::default()),
            origin: Instant::now(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, InputState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Microseconds since the queue was created, truncated to 32 bits.
    pub fn timestamp(&self) -> Timestamp {
        Timestamp(self.origin.elapsed().as_micros() as u32)
    }

    /// Buffers an input event and offers it to the installed consumer.
    pub fn deliver(&self, event: Response) {
        if !event.is_input_event() {
            warn!("InputQueue: ignoring non-input response {:?}", event);
            return;
        }
        let mut state = self.lock();
        state.track_held_keys(&event);
        trace!("InputQueue: buffered {:?}", event);
        state.buffered.push_back(event);
        state.satisfy_consumer();
    }

    /// Installs a consumer for the request behind `completer`. Completes it
    /// immediately when a matching event is already buffered.
    pub fn claim(self: &Arc<Self>, kind: ConsumerKind, completer: Completer) -> CancelHook {
        let handle = completer.handle();
        {
            let mut state = self.lock();
            if let Some(existing) = &state.consumer {
                if existing.completer.is_armed() {
                    error!(
                        "InputQueue: {:?} consumer {} replaced by {}",
                        existing.kind,
                        existing.completer.handle(),
                        handle
                    );
                    debug_assert!(false, "two input consumers installed at once");
                }
            }
            state.consumer = Some(Consumer { kind, completer });
            state.satisfy_consumer();
        }
        let queue: Weak<InputQueue> = Arc::downgrade(self);
        Box::new(move || {
            if let Some(queue) = queue.upgrade() {
                queue.release(handle);
            }
        })
    }

    fn release(&self, handle: RequestHandle) {
        let mut state = self.lock();
        if matches!(&state.consumer, Some(c) if c.completer.handle() == handle) {
            debug!("InputQueue: consumer {} removed", handle);
            state.consumer = None;
        }
    }

    pub fn is_key_down(&self, key: KeySymbol) -> bool {
        self.lock().held.contains(&key.scancode())
    }

    /// Held keys as a 256-bit map indexed by scan code (`KEYA`-style).
    pub fn held_keys(&self) -> [u8; 32] {
        let mut map = [0u8; 32];
        for &code in &self.lock().held {
            let code = code as usize;
            map[code / 8] |= 1 << (code % 8);
        }
        map
    }

    /// Drops all buffered input. An installed consumer keeps waiting.
    pub fn flush(&self) {
        let mut state = self.lock();
        debug!("InputQueue: flushed {} buffered events", state.buffered.len());
        state.buffered.clear();
    }

    pub fn pending_events(&self) -> usize {
        self.lock().buffered.len()
    }

    pub fn has_consumer(&self) -> bool {
        self.lock()
            .consumer
            .as_ref()
            .is_some_and(|c| c.completer.is_armed())
    }
}

/// Cloneable handle the host uses to feed input into the runtime.
#[derive(Clone)]
pub struct InputSender {
    queue: Arc<InputQueue>,
}

impl InputSender {
    pub fn new(queue: Arc<InputQueue>) -> Self {
        InputSender { queue }
    }

    fn key_event(&self, key: KeySymbol, modifiers: Modifiers) -> KeyEvent {
        KeyEvent::new(self.queue.timestamp(), key, modifiers)
    }

    pub fn key_down(&self, key: KeySymbol, modifiers: Modifiers) {
        self.queue.deliver(Response::KeyDown(self.key_event(key, modifiers)));
    }

    pub fn key_up(&self, key: KeySymbol, modifiers: Modifiers) {
        self.queue.deliver(Response::KeyUp(self.key_event(key, modifiers)));
    }

    /// Delivers a key press. Keys without a key code (modifiers) produce
    /// only down/up events, so a press for them is dropped.
    pub fn key_press(&self, key: KeySymbol, modifiers: Modifiers, repeat: bool) {
        if key.keycode().is_none() {
            debug!("InputSender: {:?} has no key code, no key press sent", key);
            return;
        }
        self.queue.deliver(Response::KeyPress {
            event: self.key_event(key, modifiers),
            repeat,
        });
    }

    /// The down, press, up sequence a physical keystroke produces.
    pub fn type_key(&self, key: KeySymbol, modifiers: Modifiers) {
        self.key_down(key, modifiers);
        self.key_press(key, modifiers, false);
        self.key_up(key, modifiers);
    }

    pub fn pen(&self, action: PenAction, event: PenEvent) {
        let event = PenEvent {
            timestamp: self.queue.timestamp(),
            ..event
        };
        self.queue.deliver(match action {
            PenAction::Down => Response::PenDown(event),
            PenAction::Drag => Response::PenDrag(event),
            PenAction::Up => Response::PenUp(event),
        });
    }

    pub fn foreground(&self) {
        self.queue.deliver(Response::Foreground {
            timestamp: self.queue.timestamp(),
        });
    }

    pub fn background(&self) {
        self.queue.deliver(Response::Background {
            timestamp: self.queue.timestamp(),
        });
    }

    pub fn quit(&self) {
        self.queue.deliver(Response::Quit {
            timestamp: self.queue.timestamp(),
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PenAction {
    Down,
    Drag,
    Up,
}

#[cfg(test)]
mod tests;
