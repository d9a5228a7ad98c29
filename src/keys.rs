// src/keys.rs

//! Key symbols, OPL key codes and scan codes, and modifier flags.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Keyboard modifiers, using the bit values OPL programs see in event records.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Modifiers: u32 {
        const SHIFT = 1 << 1;
        const CONTROL = 1 << 2;
        const PSION = 1 << 3; // The "Psion" key; Alt on host keyboards
        const CAPS_LOCK = 1 << 4;
        const FN = 1 << 5;
    }
}

/// Represents a physical key.
///
/// Host input layers translate their native key events into this enum; the
/// runtime derives the OPL key code, scan code and character code from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum KeySymbol {
    // Printable keys
    Char(char),

    // Modifier keys
    Shift,
    Control,
    Psion,
    Fn,
    CapsLock,

    // Navigation keys
    Left,
    Right,
    Up,
    Down,
    PageUp,
    PageDown,
    Home,
    End,

    // Other common keys
    Enter,
    Backspace,
    Delete,
    Tab,
    Escape,
    Space,
    Menu,

    #[default]
    Unknown,
}

// 16-bit OPL key codes for non-printing keys (values returned by GET/KEY).
const KEY_UP: u32 = 256;
const KEY_DOWN: u32 = 257;
const KEY_RIGHT: u32 = 258;
const KEY_LEFT: u32 = 259;
const KEY_PAGE_UP: u32 = 260;
const KEY_PAGE_DOWN: u32 = 261;
const KEY_HOME: u32 = 262;
const KEY_END: u32 = 263;
const KEY_MENU: u32 = 290;

impl KeySymbol {
    /// Returns true if the key symbol represents a modifier key.
    pub fn is_modifier(&self) -> bool {
        matches!(
            self,
            KeySymbol::Shift
                | KeySymbol::Control
                | KeySymbol::Psion
                | KeySymbol::Fn
                | KeySymbol::CapsLock
        )
    }

    /// The OPL key code delivered in key-press events, or `None` for keys
    /// that never produce a key press (modifiers, unidentified keys and
    /// characters outside Latin-1, whose code points would collide with the
    /// navigation key codes).
    pub fn keycode(&self) -> Option<u32> {
        let code = match self {
            KeySymbol::Char(c) if (*c as u32) < KEY_UP => *c as u32,
            KeySymbol::Char(_) => return None,
            KeySymbol::Enter => 13,
            KeySymbol::Backspace => 8,
            KeySymbol::Delete => 127,
            KeySymbol::Tab => 9,
            KeySymbol::Escape => 27,
            KeySymbol::Space => 32,
            KeySymbol::Up => KEY_UP,
            KeySymbol::Down => KEY_DOWN,
            KeySymbol::Right => KEY_RIGHT,
            KeySymbol::Left => KEY_LEFT,
            KeySymbol::PageUp => KEY_PAGE_UP,
            KeySymbol::PageDown => KEY_PAGE_DOWN,
            KeySymbol::Home => KEY_HOME,
            KeySymbol::End => KEY_END,
            KeySymbol::Menu => KEY_MENU,
            KeySymbol::Shift
            | KeySymbol::Control
            | KeySymbol::Psion
            | KeySymbol::Fn
            | KeySymbol::CapsLock
            | KeySymbol::Unknown => return None,
        };
        Some(code)
    }

    /// The character code carried by a key press, if the key has one.
    ///
    /// Navigation keys and the menu key have key codes but no character code.
    pub fn charcode(&self) -> Option<u32> {
        match self.keycode() {
            Some(code) if code < KEY_UP => Some(code),
            _ => None,
        }
    }

    /// The EPOC standard scan code for the key.
    pub fn scancode(&self) -> u8 {
        match self {
            KeySymbol::Char(c) => {
                let upper = c.to_ascii_uppercase();
                if upper.is_ascii_alphanumeric() {
                    upper as u8
                } else if c.is_ascii() {
                    // Punctuation has no stable mapping; report the ASCII value.
                    *c as u8
                } else {
                    0
                }
            }
            KeySymbol::Backspace => 0x01,
            KeySymbol::Tab => 0x02,
            KeySymbol::Enter => 0x03,
            KeySymbol::Escape => 0x04,
            KeySymbol::Space => 0x05,
            KeySymbol::Home => 0x08,
            KeySymbol::End => 0x09,
            KeySymbol::PageUp => 0x0a,
            KeySymbol::PageDown => 0x0b,
            KeySymbol::Delete => 0x0d,
            KeySymbol::Left => 0x0e,
            KeySymbol::Right => 0x0f,
            KeySymbol::Up => 0x10,
            KeySymbol::Down => 0x11,
            KeySymbol::Shift => 0x12,
            KeySymbol::Psion => 0x14,
            KeySymbol::Control => 0x16,
            KeySymbol::Fn => 0x18,
            KeySymbol::CapsLock => 0x1a,
            KeySymbol::Menu => 0x94,
            KeySymbol::Unknown => 0,
        }
    }
}
