// src/scheduler/request.rs
//! Request handles, request kinds and the responses that complete them.

use crate::graphics::{DrawableId, Point};
use crate::keys::{KeySymbol, Modifiers};
use std::fmt;

/// Opaque identifier correlating an issued request with its completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestHandle(pub(crate) u32);

impl RequestHandle {
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request {}", self.0)
    }
}

/// What a tracked request is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Next input event of any kind.
    NextEvent,
    /// Next key press that carries a character code.
    NextKeypress,
    Sleep,
    SleepUntil,
    PlaySound,
    /// Synthetic request used to unblock a waiting interpreter.
    Interrupt,
}

impl RequestKind {
    /// The two privileged input-queue consumers. At most one of them may be
    /// outstanding at a time.
    pub fn is_input_consumer(&self) -> bool {
        matches!(self, RequestKind::NextEvent | RequestKind::NextKeypress)
    }
}

/// Event timestamp in microseconds since the runtime started. Wraps after
/// roughly 71 minutes, like the 32-bit timestamps OPL programs read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Timestamp(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub timestamp: Timestamp,
    pub key: KeySymbol,
    pub modifiers: Modifiers,
}

impl KeyEvent {
    pub fn new(timestamp: Timestamp, key: KeySymbol, modifiers: Modifiers) -> Self {
        KeyEvent {
            timestamp,
            key,
            modifiers,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PenEvent {
    pub timestamp: Timestamp,
    /// Window the pointer event was delivered to.
    pub window: DrawableId,
    /// Position relative to the window.
    pub position: Point,
    /// Position relative to the screen.
    pub screen_position: Point,
    pub modifiers: Modifiers,
}

/// The value a request completes with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Cancelled,
    /// Generic completion without a payload (sleeps, sound playback).
    Completed,
    KeyDown(KeyEvent),
    KeyUp(KeyEvent),
    KeyPress { event: KeyEvent, repeat: bool },
    PenDown(PenEvent),
    PenDrag(PenEvent),
    PenUp(PenEvent),
    Foreground { timestamp: Timestamp },
    Background { timestamp: Timestamp },
    Quit { timestamp: Timestamp },
    /// Injected to unblock the interpreter thread, e.g. on shutdown.
    Interrupt,
}

impl Response {
    /// The character code of a key press, if this is one and it has a code.
    pub fn charcode(&self) -> Option<u32> {
        match self {
            Response::KeyPress { event, .. } => event.key.charcode(),
            _ => None,
        }
    }

    pub fn is_input_event(&self) -> bool {
        !matches!(
            self,
            Response::Cancelled | Response::Completed | Response::Interrupt
        )
    }
}
