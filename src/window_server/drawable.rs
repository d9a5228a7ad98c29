// src/window_server/drawable.rs
//! Objects tracked by the drawable registry.

use crate::graphics::{DrawableId, GraphicsMode, Point, Rect, Size, Surface};
use bitflags::bitflags;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrawableKind {
    Bitmap,
    Window,
}

/// A bitmap or a window. Windows add a screen position, visibility and an
/// optional drop shadow to the shared surface.
#[derive(Debug, Clone)]
pub struct Drawable {
    pub id: DrawableId,
    pub kind: DrawableKind,
    pub surface: Surface,
    pub position: Point,
    pub visible: bool,
    /// Shadow depth in pixels; zero for none.
    pub shadow: i32,
}

impl Drawable {
    pub fn bitmap(id: DrawableId, size: Size, mode: GraphicsMode) -> Self {
        Drawable {
            id,
            kind: DrawableKind::Bitmap,
            surface: Surface::new(size, mode),
            position: Point::ZERO,
            visible: false,
            shadow: 0,
        }
    }

    pub fn window(id: DrawableId, rect: Rect, mode: GraphicsMode, shadow: i32) -> Self {
        Drawable {
            id,
            kind: DrawableKind::Window,
            surface: Surface::new(rect.size, mode),
            position: rect.origin,
            visible: false,
            shadow: shadow.max(0),
        }
    }

    pub fn is_window(&self) -> bool {
        self.kind == DrawableKind::Window
    }

    /// Screen area covered by a window.
    pub fn frame(&self) -> Rect {
        Rect {
            origin: self.position,
            size: self.surface.size(),
        }
    }

    pub fn info(&self) -> DrawableInfo {
        DrawableInfo {
            id: self.id,
            kind: self.kind,
            size: self.surface.size(),
            mode: self.surface.mode(),
            visible: self.visible,
            position: self.position,
        }
    }
}

/// Snapshot of a drawable's attributes, as returned to the interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawableInfo {
    pub id: DrawableId,
    pub kind: DrawableKind,
    pub size: Size,
    pub mode: GraphicsMode,
    pub visible: bool,
    pub position: Point,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpriteFrame {
    pub bitmap: DrawableId,
    /// Pixels are drawn where the mask is dark. Without a mask, white is transparent.
    pub mask: Option<DrawableId>,
    pub offset: Point,
    pub duration: Duration,
}

/// An animated image drawn on top of a window at `position`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sprite {
    pub position: Point,
    pub frames: Vec<SpriteFrame>,
}

impl Sprite {
    pub fn is_animated(&self) -> bool {
        self.frames.len() > 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClockMode {
    Digital,
    Analog,
    /// A chrono `strftime`-style format string.
    Formatted(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockInfo {
    pub mode: ClockMode,
    pub position: Point,
}

/// What a clock overlay currently shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockFace {
    pub time: NaiveTime,
    /// Rendered text; empty for analog faces.
    pub text: String,
}

bitflags! {
    /// `gTEXTCURSOR`-style flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct CursorFlags: u32 {
        const OBLOID = 1;
        const NO_FLASH = 2;
        const GRAY = 4;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorSpec {
    pub window: DrawableId,
    pub rect: Rect,
    pub flags: CursorFlags,
}
