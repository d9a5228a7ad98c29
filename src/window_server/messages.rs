// src/window_server/messages.rs
//! Message types between the interpreter-side handle and the window-server actor.
//!
//! Every request gets exactly one response on the reply channel that travels
//! with it.

use super::drawable::{ClockFace, ClockInfo, CursorSpec, DrawableInfo, Sprite};
use super::WindowServerError;
use crate::graphics::{DrawCommand, DrawableId, GraphicsMode, Point, Rect, Size, Surface};
use std::sync::mpsc::Sender;
use std::time::Duration;

/// Requests sent to the window-server actor.
#[derive(Debug, Clone)]
pub enum GraphicsRequest {
    /// Responds with `Created`.
    CreateBitmap { size: Size, mode: GraphicsMode },

    /// Responds with `Created`. The window starts hidden.
    CreateWindow {
        rect: Rect,
        mode: GraphicsMode,
        shadow: i32,
    },

    Close(DrawableId),

    SetVisibility { id: DrawableId, visible: bool },

    /// 1-based position from the front.
    Order { id: DrawableId, position: i32 },

    SetWin {
        id: DrawableId,
        position: Point,
        size: Option<Size>,
    },

    /// `None` deletes the slot. May respond with `Failed`.
    Sprite {
        window: DrawableId,
        slot: u32,
        sprite: Option<Sprite>,
    },

    Clock {
        id: DrawableId,
        info: Option<ClockInfo>,
    },

    Cursor(Option<CursorSpec>),

    /// Show `id` as the busy overlay after `delay`; `None` hides it.
    Busy {
        id: Option<DrawableId>,
        delay: Duration,
    },

    /// Show `id` as the info overlay for the configured duration; `None` hides it.
    InfoPrint(Option<DrawableId>),

    Draw(Vec<DrawCommand>),

    /// Responds with `Bytes`.
    PeekLine {
        id: DrawableId,
        position: Point,
        count: usize,
        mode: GraphicsMode,
    },

    /// Responds with `Screenshot`.
    Screenshot,

    /// Responds with `Info`.
    DrawableInfo(DrawableId),

    /// Responds with `Order`.
    WindowOrder,

    /// Responds with `ClockFace`.
    ClockFace(DrawableId),

    /// Stops the actor after replying.
    Shutdown,
}

/// Responses sent back from the window-server actor.
#[derive(Debug)]
pub enum GraphicsResponse {
    Done,
    Created(DrawableId),
    Bytes(Vec<u8>),
    Screenshot(Surface),
    Info(Option<DrawableInfo>),
    Order(Vec<DrawableId>),
    ClockFace(Option<ClockFace>),
    Failed(WindowServerError),
}

/// A request paired with the channel its response goes back on.
pub(crate) struct Envelope {
    pub request: GraphicsRequest,
    pub reply: Sender<GraphicsResponse>,
}
