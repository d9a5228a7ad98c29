// src/window_server/registry.rs
//! The drawable registry: every bitmap, window, sprite, clock and overlay the
//! interpreter has created, plus the window z-order.
//!
//! The registry is plain state. It is owned by the window-server actor, which
//! serializes every call, so nothing here locks. Timers that drive overlays
//! and animation live on the actor; the registry only records enough state
//! (generations, armed flags) for the actor to discard stale ticks.

use super::drawable::{
    ClockFace, ClockInfo, ClockMode, CursorSpec, Drawable, DrawableInfo, Sprite,
};
use super::WindowServerError;
use crate::color::Color;
use crate::graphics::surface::Pixels;
use crate::graphics::{
    DrawCommand, DrawKind, DrawableId, GraphicsMode, Point, Rect, Size, SourceRect, Surface,
};
use chrono::NaiveTime;
use log::*;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;
use std::time::Duration;

/// Shortest delay between two animation frames.
const MIN_FRAME_DURATION: Duration = Duration::from_millis(10);

struct SpriteSlot {
    window: DrawableId,
    sprite: Sprite,
    frame: usize,
    generation: u64,
    timer_armed: bool,
}

impl SpriteSlot {
    fn frame_delay(&self) -> Duration {
        self.sprite
            .frames
            .get(self.frame)
            .map(|f| f.duration)
            .unwrap_or_default()
            .max(MIN_FRAME_DURATION)
    }
}

struct ClockOverlay {
    info: ClockInfo,
    face: ClockFace,
}

/// An animation timer the actor must arm for a sprite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpriteTimer {
    pub slot: u32,
    pub generation: u64,
    pub delay: Duration,
}

pub struct Registry {
    screen: Size,
    mode: GraphicsMode,
    next_id: u32,
    drawables: HashMap<DrawableId, Drawable>,
    /// Open windows, frontmost first.
    z_order: Vec<DrawableId>,
    sprites: BTreeMap<u32, SpriteSlot>,
    next_sprite_generation: u64,
    clocks: BTreeMap<DrawableId, ClockOverlay>,
    cursor: Option<CursorSpec>,
    busy: Option<DrawableId>,
    info: Option<DrawableId>,
}

impl Registry {
    /// Creates a registry holding only the default window, shown and
    /// covering the whole screen.
    pub fn new(screen: Size, mode: GraphicsMode) -> Self {
        let id = DrawableId::DEFAULT_WINDOW;
        let mut window = Drawable::window(id, Rect::from_size(screen), mode, 0);
        window.visible = true;
        Registry {
            screen,
            mode,
            next_id: id.0 + 1,
            drawables: HashMap::from([(id, window)]),
            z_order: vec![id],
            sprites: BTreeMap::new(),
            next_sprite_generation: 0,
            clocks: BTreeMap::new(),
            cursor: None,
            busy: None,
            info: None,
        }
    }

    fn allocate_id(&mut self) -> DrawableId {
        let id = DrawableId(self.next_id);
        self.next_id += 1;
        id
    }

    fn window(&self, id: DrawableId) -> Option<&Drawable> {
        self.drawables.get(&id).filter(|d| d.is_window())
    }

    fn window_mut(&mut self, id: DrawableId) -> Option<&mut Drawable> {
        self.drawables.get_mut(&id).filter(|d| d.is_window())
    }

    pub fn contains(&self, id: DrawableId) -> bool {
        self.drawables.contains_key(&id)
    }

    pub fn create_bitmap(&mut self, size: Size, mode: GraphicsMode) -> DrawableId {
        let id = self.allocate_id();
        self.drawables.insert(id, Drawable::bitmap(id, size, mode));
        debug!("WindowServer: created bitmap {} {:?} {:?}", id, size, mode);
        id
    }

    /// Creates a hidden window in front of all others.
    pub fn create_window(&mut self, rect: Rect, mode: GraphicsMode, shadow: i32) -> DrawableId {
        let id = self.allocate_id();
        self.drawables.insert(id, Drawable::window(id, rect, mode, shadow));
        self.z_order.insert(0, id);
        self.raise_info();
        debug!("WindowServer: created window {} at {:?} {:?}", id, rect, mode);
        id
    }

    pub fn set_visibility(&mut self, id: DrawableId, visible: bool) {
        match self.window_mut(id) {
            Some(window) => window.visible = visible,
            None => debug!("WindowServer: visibility change for unknown window {}", id),
        }
    }

    /// Moves a window to `position` in the z-order, counted from 1 at the
    /// front. Positions past the back clamp to the back; 0 counts as 1.
    pub fn order(&mut self, id: DrawableId, position: i32) {
        let Some(current) = self.z_order.iter().position(|w| *w == id) else {
            debug!("WindowServer: order for unknown window {}", id);
            return;
        };
        self.z_order.remove(current);
        let index = (position.max(1) as usize - 1).min(self.z_order.len());
        self.z_order.insert(index, id);
        self.raise_info();
    }

    fn bring_to_front(&mut self, id: DrawableId) {
        if let Some(current) = self.z_order.iter().position(|w| *w == id) {
            self.z_order.remove(current);
            self.z_order.insert(0, id);
        }
    }

    /// A shown info overlay is always the frontmost window.
    fn raise_info(&mut self) {
        if let Some(info) = self.info {
            self.bring_to_front(info);
        }
    }

    /// Removes a drawable along with its sprites, clock and cursor.
    pub fn close(&mut self, id: DrawableId) {
        if id == DrawableId::DEFAULT_WINDOW {
            warn!("WindowServer: the default window cannot be closed");
            return;
        }
        if self.drawables.remove(&id).is_none() {
            debug!("WindowServer: close of unknown drawable {}", id);
            return;
        }
        self.z_order.retain(|w| *w != id);
        self.sprites.retain(|_, slot| slot.window != id);
        self.clocks.remove(&id);
        if self.cursor.is_some_and(|c| c.window == id) {
            self.cursor = None;
        }
        if self.busy == Some(id) {
            self.busy = None;
        }
        if self.info == Some(id) {
            self.info = None;
        }
        debug!("WindowServer: closed {}", id);
    }

    /// Moves and optionally resizes a window. The default window stays put.
    pub fn set_win(&mut self, id: DrawableId, position: Point, size: Option<Size>) {
        if id == DrawableId::DEFAULT_WINDOW {
            debug!("WindowServer: ignoring set_win on the default window");
            return;
        }
        let Some(window) = self.window_mut(id) else {
            debug!("WindowServer: set_win for unknown window {}", id);
            return;
        };
        window.position = position;
        if let Some(size) = size {
            window.surface.resize(size);
        }
    }

    /// Binds, replaces or (with `None`) deletes the sprite in `slot`.
    ///
    /// A slot stays bound to the window it was first created on until it is
    /// deleted.
    pub fn set_sprite(
        &mut self,
        window: DrawableId,
        slot: u32,
        sprite: Option<Sprite>,
    ) -> Result<(), WindowServerError> {
        let Some(sprite) = sprite else {
            if self.sprites.remove(&slot).is_some() {
                debug!("WindowServer: deleted sprite {}", slot);
            }
            return Ok(());
        };
        if let Some(existing) = self.sprites.get(&slot) {
            if existing.window != window {
                error!(
                    "WindowServer: sprite {} is bound to {}, refusing to move it to {}",
                    slot, existing.window, window
                );
                return Err(WindowServerError::SpriteMigration {
                    slot,
                    bound: existing.window,
                    requested: window,
                });
            }
        }
        if self.window(window).is_none() {
            warn!("WindowServer: sprite {} for unknown window {}", slot, window);
            return Ok(());
        }
        self.next_sprite_generation += 1;
        self.sprites.insert(
            slot,
            SpriteSlot {
                window,
                sprite,
                frame: 0,
                generation: self.next_sprite_generation,
                timer_armed: false,
            },
        );
        Ok(())
    }

    /// Marks the sprite's animation timer as armed and returns the delay
    /// until its next frame. Sprites with a single frame need no timer.
    pub fn arm_sprite_timer(&mut self, slot: u32) -> Result<Option<SpriteTimer>, WindowServerError> {
        let Some(state) = self.sprites.get_mut(&slot) else {
            return Ok(None);
        };
        if !state.sprite.is_animated() {
            return Ok(None);
        }
        if state.timer_armed {
            return Err(WindowServerError::SpriteTimerAlreadyArmed { slot });
        }
        state.timer_armed = true;
        Ok(Some(SpriteTimer {
            slot,
            generation: state.generation,
            delay: state.frame_delay(),
        }))
    }

    /// Advances an animated sprite by one frame and disarms its timer so the
    /// next frame can be scheduled. Returns false when the sprite is gone or
    /// was replaced since the timer was armed.
    pub fn sprite_tick(&mut self, slot: u32, generation: u64) -> bool {
        let Some(state) = self.sprites.get_mut(&slot) else {
            return false;
        };
        if state.generation != generation || state.sprite.frames.is_empty() {
            return false;
        }
        state.frame = (state.frame + 1) % state.sprite.frames.len();
        state.timer_armed = false;
        trace!("WindowServer: sprite {} frame {}", slot, state.frame);
        true
    }

    pub fn sprite_frame(&self, slot: u32) -> Option<usize> {
        self.sprites.get(&slot).map(|s| s.frame)
    }

    /// Attaches, replaces or (with `None`) removes a window's clock.
    pub fn clock(&mut self, id: DrawableId, info: Option<ClockInfo>, now: NaiveTime) {
        let Some(info) = info else {
            self.clocks.remove(&id);
            return;
        };
        if self.window(id).is_none() {
            warn!("WindowServer: clock for unknown window {}", id);
            return;
        }
        let face = render_face(&info.mode, now);
        self.clocks.insert(id, ClockOverlay { info, face });
    }

    pub fn has_clocks(&self) -> bool {
        !self.clocks.is_empty()
    }

    pub fn repaint_clocks(&mut self, now: NaiveTime) {
        for clock in self.clocks.values_mut() {
            clock.face = render_face(&clock.info.mode, now);
        }
    }

    pub fn clock_face(&self, id: DrawableId) -> Option<ClockFace> {
        self.clocks.get(&id).map(|c| c.face.clone())
    }

    pub fn set_cursor(&mut self, cursor: Option<CursorSpec>) {
        if let Some(spec) = cursor {
            if self.window(spec.window).is_none() {
                warn!("WindowServer: cursor for unknown window {}", spec.window);
                return;
            }
        }
        self.cursor = cursor;
    }

    pub fn cursor(&self) -> Option<CursorSpec> {
        self.cursor
    }

    /// Shows `id` as the busy overlay, replacing any busy overlay shown.
    pub fn show_busy(&mut self, id: DrawableId) {
        if self.window(id).is_none() {
            warn!("WindowServer: busy overlay {} is not a window", id);
            return;
        }
        if self.busy.is_some_and(|shown| shown != id) {
            self.hide_busy();
        }
        self.set_visibility(id, true);
        self.bring_to_front(id);
        self.raise_info();
        self.busy = Some(id);
    }

    pub fn hide_busy(&mut self) {
        if let Some(id) = self.busy.take() {
            self.set_visibility(id, false);
        }
    }

    pub fn busy_window(&self) -> Option<DrawableId> {
        self.busy
    }

    /// Shows `id` as the frontmost info overlay, replacing any shown one.
    pub fn show_info(&mut self, id: DrawableId) {
        if self.window(id).is_none() {
            warn!("WindowServer: info overlay {} is not a window", id);
            return;
        }
        if self.info.is_some_and(|shown| shown != id) {
            self.hide_info();
        }
        self.set_visibility(id, true);
        self.info = Some(id);
        self.raise_info();
    }

    pub fn hide_info(&mut self) {
        if let Some(id) = self.info.take() {
            self.set_visibility(id, false);
        }
    }

    /// Executes draw commands in order. Commands aimed at, or reading from,
    /// unknown drawables are dropped.
    pub fn draw(&mut self, commands: &[DrawCommand]) {
        for command in commands {
            self.draw_one(command);
        }
    }

    fn draw_one(&mut self, command: &DrawCommand) {
        if !self.contains(command.target) {
            warn!(
                "WindowServer: dropping draw command for unknown drawable {}",
                command.target
            );
            return;
        }
        let (source, mask) = match &command.kind {
            DrawKind::Copy { source, mask } => {
                let Some(pixels) = self.region(source) else {
                    return;
                };
                let mask = match mask {
                    Some(mask) => match self.region(mask) {
                        Some(pixels) => Some(pixels),
                        None => return,
                    },
                    None => None,
                };
                (Some(pixels), mask)
            }
            DrawKind::Pattern { source, .. } => match self.region(source) {
                Some(pixels) => (Some(pixels), None),
                None => return,
            },
            _ => (None, None),
        };
        if let Some(target) = self.drawables.get_mut(&command.target) {
            target
                .surface
                .apply(command, source.as_ref(), mask.as_ref());
        }
    }

    fn region(&self, source: &SourceRect) -> Option<Pixels> {
        let region = self.drawables.get(&source.id).map(|d| d.surface.region(source.rect));
        if region.is_none() {
            warn!(
                "WindowServer: dropping draw command reading unknown drawable {}",
                source.id
            );
        }
        region
    }

    /// Reads one row of pixels packed in `mode`. Unknown drawables read as empty.
    pub fn peek_line(&self, id: DrawableId, pos: Point, count: usize, mode: GraphicsMode) -> Vec<u8> {
        match self.drawables.get(&id) {
            Some(drawable) => drawable.surface.peek_line(pos, count, mode),
            None => {
                warn!("WindowServer: peek_line on unknown drawable {}", id);
                Vec::new()
            }
        }
    }

    pub fn drawable_info(&self, id: DrawableId) -> Option<DrawableInfo> {
        self.drawables.get(&id).map(Drawable::info)
    }

    pub fn window_order(&self) -> Vec<DrawableId> {
        self.z_order.clone()
    }

    /// Composes the visible windows and their sprites back to front.
    pub fn screenshot(&self) -> Surface {
        let mut screen = Surface::new(self.screen, self.mode);
        for id in self.z_order.iter().rev() {
            let Some(window) = self.drawables.get(id) else {
                continue;
            };
            if !window.visible {
                continue;
            }
            if window.shadow > 0 {
                screen.darken(window.frame().translated(window.shadow, window.shadow));
            }
            window.surface.composite_onto(&mut screen, window.position);
            self.composite_sprites(window, &mut screen);
        }
        screen
    }

    fn composite_sprites(&self, window: &Drawable, screen: &mut Surface) {
        let frame_rect = window.frame();
        for slot in self.sprites.values().filter(|s| s.window == window.id) {
            let Some(frame) = slot.sprite.frames.get(slot.frame) else {
                continue;
            };
            let Some(bitmap) = self.drawables.get(&frame.bitmap) else {
                continue;
            };
            let mask = frame.mask.and_then(|m| self.drawables.get(&m));
            let origin = window
                .position
                .offset(slot.sprite.position.x, slot.sprite.position.y)
                .offset(frame.offset.x, frame.offset.y);
            let placed = Rect {
                origin,
                size: bitmap.surface.size(),
            };
            let Some(visible) = placed
                .intersection(&frame_rect)
                .and_then(|r| r.intersection(&screen.bounds()))
            else {
                continue;
            };
            for y in visible.min_y()..visible.max_y() {
                for x in visible.min_x()..visible.max_x() {
                    let local = Point::new(x.saturating_sub(origin.x), y.saturating_sub(origin.y));
                    let Some(color) = bitmap.surface.pixel(local) else {
                        continue;
                    };
                    let opaque = match mask {
                        Some(mask) => mask
                            .surface
                            .pixel(local)
                            .is_some_and(|m| m.luminance() < 128),
                        None => color != Color::WHITE,
                    };
                    if opaque {
                        screen.set_pixel(x, y, color);
                    }
                }
            }
        }
    }
}

fn render_face(mode: &ClockMode, now: NaiveTime) -> ClockFace {
    let text = match mode {
        ClockMode::Digital => now.format("%H:%M").to_string(),
        ClockMode::Analog => String::new(),
        ClockMode::Formatted(format) => {
            let mut text = String::new();
            if write!(text, "{}", now.format(format)).is_err() {
                warn!("WindowServer: invalid clock format {:?}", format);
                text = now.format("%H:%M").to_string();
            }
            text
        }
    };
    ClockFace { time: now, text }
}
