// src/runtime/event_record.rs
//! Interpreter-visible forms of request completions.

use crate::scheduler::{KeyEvent, PenEvent, Response};

/// OPL's "I/O cancelled" status.
pub const STATUS_CANCELLED: i32 = -48;

/// A decoded completion, as the interpreter sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Cancelled,
    Completed,
    Event(EventRecord),
    /// The runtime was interrupted, e.g. for shutdown.
    Interrupted,
}

impl Completion {
    pub fn from_response(response: &Response) -> Self {
        match response {
            Response::Cancelled => Completion::Cancelled,
            Response::Completed => Completion::Completed,
            Response::Interrupt => Completion::Interrupted,
            event => match EventRecord::from_response(event) {
                Some(record) => Completion::Event(record),
                None => Completion::Completed,
            },
        }
    }

    /// The request status word written back to the interpreter.
    pub fn status(&self) -> i32 {
        match self {
            Completion::Cancelled => STATUS_CANCELLED,
            _ => 0,
        }
    }
}

/// The 16-slot event array filled in by `GETEVENT32`.
///
/// Slot 0 holds the key code for key presses, or one of the event type
/// constants for everything else. Slot 1 is always the timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventRecord(pub [i32; 16]);

impl EventRecord {
    pub const FOREGROUND: i32 = 0x401;
    pub const BACKGROUND: i32 = 0x402;
    pub const COMMAND: i32 = 0x404;
    pub const KEY_DOWN: i32 = 0x406;
    pub const KEY_UP: i32 = 0x407;
    pub const PEN: i32 = 0x408;

    pub const PEN_DOWN: i32 = 0;
    pub const PEN_UP: i32 = 1;
    pub const PEN_DRAG: i32 = 6;

    /// Encodes an input response. Non-input responses have no record.
    pub fn from_response(response: &Response) -> Option<Self> {
        let mut slots = [0i32; 16];
        match response {
            Response::KeyPress { event, repeat } => {
                slots[0] = event.key.keycode().unwrap_or(0) as i32;
                Self::key_slots(&mut slots, event);
                slots[4] = *repeat as i32;
            }
            Response::KeyDown(event) => {
                slots[0] = Self::KEY_DOWN;
                Self::key_slots(&mut slots, event);
            }
            Response::KeyUp(event) => {
                slots[0] = Self::KEY_UP;
                Self::key_slots(&mut slots, event);
            }
            Response::PenDown(event) => Self::pen_slots(&mut slots, event, Self::PEN_DOWN),
            Response::PenUp(event) => Self::pen_slots(&mut slots, event, Self::PEN_UP),
            Response::PenDrag(event) => Self::pen_slots(&mut slots, event, Self::PEN_DRAG),
            Response::Foreground { timestamp } => {
                slots[0] = Self::FOREGROUND;
                slots[1] = timestamp.0 as i32;
            }
            Response::Background { timestamp } => {
                slots[0] = Self::BACKGROUND;
                slots[1] = timestamp.0 as i32;
            }
            Response::Quit { timestamp } => {
                slots[0] = Self::COMMAND;
                slots[1] = timestamp.0 as i32;
            }
            Response::Cancelled | Response::Completed | Response::Interrupt => return None,
        }
        Some(EventRecord(slots))
    }

    fn key_slots(slots: &mut [i32; 16], event: &KeyEvent) {
        slots[1] = event.timestamp.0 as i32;
        slots[2] = event.key.scancode() as i32;
        slots[3] = event.modifiers.bits() as i32;
    }

    fn pen_slots(slots: &mut [i32; 16], event: &PenEvent, pen_type: i32) {
        slots[0] = Self::PEN;
        slots[1] = event.timestamp.0 as i32;
        slots[2] = event.window.0 as i32;
        slots[3] = pen_type;
        slots[4] = event.modifiers.bits() as i32;
        slots[5] = event.position.x;
        slots[6] = event.position.y;
        slots[7] = event.screen_position.x;
        slots[8] = event.screen_position.y;
    }

    pub fn event_type(&self) -> i32 {
        self.0[0]
    }

    pub fn slots(&self) -> &[i32; 16] {
        &self.0
    }
}
