// src/window_server/mod.rs
//! Window server: bitmaps, windows, sprites, clocks and overlays.
//!
//! - `Registry`: the state, with no threading of its own
//! - `WindowServer`: the actor thread that owns the registry and its timers
//! - `WindowServerHandle`: the synchronous, cloneable call interface

mod actor;
pub mod drawable;
pub mod messages;
pub mod registry;
mod timers;

pub use actor::{WindowServer, WindowServerHandle};
pub use drawable::{
    ClockFace, ClockInfo, ClockMode, CursorFlags, CursorSpec, DrawableInfo, DrawableKind, Sprite,
    SpriteFrame,
};
pub use messages::{GraphicsRequest, GraphicsResponse};
pub use registry::Registry;
pub use timers::delay_to_next_minute;

use crate::graphics::DrawableId;
use thiserror::Error;

/// Invariant violations the window server refuses to carry out.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WindowServerError {
    #[error("sprite {slot} belongs to window {bound} and cannot move to window {requested}")]
    SpriteMigration {
        slot: u32,
        bound: DrawableId,
        requested: DrawableId,
    },
    #[error("sprite {slot} already has an animation timer")]
    SpriteTimerAlreadyArmed { slot: u32 },
}
