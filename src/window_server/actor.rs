// src/window_server/actor.rs
//! Window-server actor: owns the registry on a background thread.
//!
//! Interpreter-side callers hold a `WindowServerHandle` and block on a reply
//! channel for every call, so registry operations are totally ordered by the
//! actor's request channel. Busy, info-print, clock and sprite timers live
//! in a deadline heap on the same thread; the loop waits on the channel with
//! `recv_timeout` set to the next deadline.

use super::drawable::{ClockFace, ClockInfo, CursorSpec, DrawableInfo, Sprite};
use super::messages::{Envelope, GraphicsRequest, GraphicsResponse};
use super::registry::Registry;
use super::timers::{delay_to_next_minute, delay_to_next_tick, TimerKind, TimerQueue};
use super::WindowServerError;
use crate::config::Config;
use crate::graphics::{DrawCommand, DrawableId, GraphicsMode, Point, Rect, Size, Surface};
use crate::producers::timer::deadline_after;
use anyhow::{anyhow, bail, Context, Result};
use chrono::{Local, NaiveTime};
use log::*;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

fn local_time() -> NaiveTime {
    Local::now().time()
}

/// Everything the actor thread owns.
pub(crate) struct ServerState {
    pub(crate) registry: Registry,
    timers: TimerQueue,
    busy_generation: u64,
    info_generation: u64,
    clock_timer_armed: bool,
    info_duration: Duration,
    /// Wall-clock source for clock faces and tick alignment.
    pub(crate) wall_clock: fn() -> NaiveTime,
}

impl ServerState {
    pub(crate) fn new(config: &Config) -> Self {
        ServerState {
            registry: Registry::new(config.screen.size(), config.screen.mode),
            timers: TimerQueue::default(),
            busy_generation: 0,
            info_generation: 0,
            clock_timer_armed: false,
            info_duration: config.overlays.info_print_duration(),
            wall_clock: local_time,
        }
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    pub(crate) fn handle(&mut self, request: GraphicsRequest, now: Instant) -> GraphicsResponse {
        trace!("WindowServer: handling {:?}", request);
        match request {
            GraphicsRequest::CreateBitmap { size, mode } => {
                GraphicsResponse::Created(self.registry.create_bitmap(size, mode))
            }
            GraphicsRequest::CreateWindow { rect, mode, shadow } => {
                GraphicsResponse::Created(self.registry.create_window(rect, mode, shadow))
            }
            GraphicsRequest::Close(id) => {
                self.registry.close(id);
                GraphicsResponse::Done
            }
            GraphicsRequest::SetVisibility { id, visible } => {
                self.registry.set_visibility(id, visible);
                GraphicsResponse::Done
            }
            GraphicsRequest::Order { id, position } => {
                self.registry.order(id, position);
                GraphicsResponse::Done
            }
            GraphicsRequest::SetWin { id, position, size } => {
                self.registry.set_win(id, position, size);
                GraphicsResponse::Done
            }
            GraphicsRequest::Sprite {
                window,
                slot,
                sprite,
            } => match self.set_sprite(window, slot, sprite, now) {
                Ok(()) => GraphicsResponse::Done,
                Err(e) => GraphicsResponse::Failed(e),
            },
            GraphicsRequest::Clock { id, info } => {
                self.registry.clock(id, info, (self.wall_clock)());
                self.ensure_clock_timer(now);
                GraphicsResponse::Done
            }
            GraphicsRequest::Cursor(spec) => {
                self.registry.set_cursor(spec);
                GraphicsResponse::Done
            }
            GraphicsRequest::Busy { id, delay } => {
                self.busy(id, delay, now);
                GraphicsResponse::Done
            }
            GraphicsRequest::InfoPrint(id) => {
                self.info_print(id, now);
                GraphicsResponse::Done
            }
            GraphicsRequest::Draw(commands) => {
                self.registry.draw(&commands);
                GraphicsResponse::Done
            }
            GraphicsRequest::PeekLine {
                id,
                position,
                count,
                mode,
            } => GraphicsResponse::Bytes(self.registry.peek_line(id, position, count, mode)),
            GraphicsRequest::Screenshot => GraphicsResponse::Screenshot(self.registry.screenshot()),
            GraphicsRequest::DrawableInfo(id) => {
                GraphicsResponse::Info(self.registry.drawable_info(id))
            }
            GraphicsRequest::WindowOrder => GraphicsResponse::Order(self.registry.window_order()),
            GraphicsRequest::ClockFace(id) => {
                GraphicsResponse::ClockFace(self.registry.clock_face(id))
            }
            GraphicsRequest::Shutdown => GraphicsResponse::Done,
        }
    }

    fn set_sprite(
        &mut self,
        window: DrawableId,
        slot: u32,
        sprite: Option<Sprite>,
        now: Instant,
    ) -> Result<(), WindowServerError> {
        self.registry.set_sprite(window, slot, sprite)?;
        self.arm_sprite_timer(slot, now)
    }

    fn arm_sprite_timer(&mut self, slot: u32, now: Instant) -> Result<(), WindowServerError> {
        if let Some(timer) = self.registry.arm_sprite_timer(slot)? {
            self.timers.arm(
                deadline_after(now, timer.delay),
                TimerKind::SpriteTick {
                    slot,
                    generation: timer.generation,
                },
            );
        }
        Ok(())
    }

    /// Arms the shared minute tick the first time a clock exists.
    fn ensure_clock_timer(&mut self, now: Instant) {
        if self.clock_timer_armed || !self.registry.has_clocks() {
            return;
        }
        let delay = delay_to_next_minute((self.wall_clock)());
        debug!("WindowServer: first clock tick in {:?}", delay);
        self.timers.arm(deadline_after(now, delay), TimerKind::ClockTick);
        self.clock_timer_armed = true;
    }

    fn busy(&mut self, id: Option<DrawableId>, delay: Duration, now: Instant) {
        // Any pending show is stale from here on.
        self.busy_generation += 1;
        self.registry.hide_busy();
        let Some(id) = id else {
            return;
        };
        if delay.is_zero() {
            self.registry.show_busy(id);
        } else {
            self.timers.arm(
                deadline_after(now, delay),
                TimerKind::BusyShow {
                    id,
                    generation: self.busy_generation,
                },
            );
        }
    }

    fn info_print(&mut self, id: Option<DrawableId>, now: Instant) {
        self.info_generation += 1;
        self.registry.hide_info();
        let Some(id) = id else {
            return;
        };
        self.registry.show_info(id);
        self.timers.arm(
            deadline_after(now, self.info_duration),
            TimerKind::InfoHide {
                generation: self.info_generation,
            },
        );
    }

    /// Fires every timer due at `now`.
    pub(crate) fn run_timers(&mut self, now: Instant) {
        for timer in self.timers.pop_due(now) {
            self.fire(timer, now);
        }
    }

    fn fire(&mut self, timer: TimerKind, now: Instant) {
        match timer {
            TimerKind::BusyShow { id, generation } => {
                if generation == self.busy_generation {
                    self.registry.show_busy(id);
                }
            }
            TimerKind::InfoHide { generation } => {
                if generation == self.info_generation {
                    self.registry.hide_info();
                }
            }
            TimerKind::ClockTick => {
                if self.registry.has_clocks() {
                    trace!("WindowServer: clock tick");
                    let wall = (self.wall_clock)();
                    self.registry.repaint_clocks(wall);
                    self.timers
                        .arm(deadline_after(now, delay_to_next_tick(wall)), TimerKind::ClockTick);
                } else {
                    debug!("WindowServer: no clocks left, tick timer stopped");
                    self.clock_timer_armed = false;
                }
            }
            TimerKind::SpriteTick { slot, generation } => {
                if !self.registry.sprite_tick(slot, generation) {
                    return;
                }
                if let Err(e) = self.arm_sprite_timer(slot, now) {
                    error!("WindowServer: {}", e);
                    debug_assert!(false, "sprite {} re-armed while armed", slot);
                }
            }
        }
    }
}

/// Owner of the window-server thread. Dropping it stops the actor.
pub struct WindowServer {
    handle: WindowServerHandle,
    thread_handle: Option<JoinHandle<()>>,
}

impl WindowServer {
    pub fn spawn(config: &Config) -> Result<Self> {
        info!("WindowServer: Spawning background thread");
        let (tx, rx) = mpsc::channel();
        let state = ServerState::new(config);
        let thread_handle = thread::Builder::new()
            .name("window-server".to_string())
            .spawn(move || {
                if let Err(e) = Self::actor_thread_main(state, rx) {
                    error!("WindowServer thread error: {:#}", e);
                }
            })
            .context("Failed to spawn window server thread")?;

        Ok(WindowServer {
            handle: WindowServerHandle { tx },
            thread_handle: Some(thread_handle),
        })
    }

    pub fn handle(&self) -> WindowServerHandle {
        self.handle.clone()
    }

    fn actor_thread_main(mut state: ServerState, rx: Receiver<Envelope>) -> Result<()> {
        loop {
            let received = match state.next_deadline() {
                Some(deadline) => {
                    match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                        Ok(envelope) => Some(envelope),
                        Err(RecvTimeoutError::Timeout) => None,
                        Err(RecvTimeoutError::Disconnected) => {
                            bail!("request channel closed without shutdown")
                        }
                    }
                }
                None => Some(rx.recv().context("request channel closed without shutdown")?),
            };

            if let Some(Envelope { request, reply }) = received {
                let shutdown = matches!(request, GraphicsRequest::Shutdown);
                let response = state.handle(request, Instant::now());
                // Caller may be gone.
                let _ = reply.send(response);
                if shutdown {
                    info!("WindowServer: shutting down");
                    return Ok(());
                }
            }
            state.run_timers(Instant::now());
        }
    }
}

impl Drop for WindowServer {
    fn drop(&mut self) {
        if let Err(e) = self.handle.call(GraphicsRequest::Shutdown) {
            warn!("WindowServer: shutdown request failed: {:#}", e);
        }
        if let Some(thread_handle) = self.thread_handle.take() {
            if thread_handle.join().is_err() {
                error!("WindowServer thread panicked");
            }
        }
    }
}

/// Cloneable, synchronous interface to the window server.
#[derive(Clone)]
pub struct WindowServerHandle {
    tx: Sender<Envelope>,
}

fn unexpected(response: GraphicsResponse) -> anyhow::Error {
    anyhow!("unexpected window server response: {:?}", response)
}

impl WindowServerHandle {
    /// Sends a request and blocks until the actor replies.
    pub fn call(&self, request: GraphicsRequest) -> Result<GraphicsResponse> {
        let (reply, reply_rx) = mpsc::channel();
        self.tx
            .send(Envelope { request, reply })
            .map_err(|_| anyhow!("window server has shut down"))?;
        reply_rx
            .recv()
            .context("window server dropped the request")
    }

    fn call_done(&self, request: GraphicsRequest) -> Result<()> {
        match self.call(request)? {
            GraphicsResponse::Done => Ok(()),
            GraphicsResponse::Failed(e) => Err(e.into()),
            other => Err(unexpected(other)),
        }
    }

    fn call_created(&self, request: GraphicsRequest) -> Result<DrawableId> {
        match self.call(request)? {
            GraphicsResponse::Created(id) => Ok(id),
            other => Err(unexpected(other)),
        }
    }

    pub fn create_bitmap(&self, size: Size, mode: GraphicsMode) -> Result<DrawableId> {
        self.call_created(GraphicsRequest::CreateBitmap { size, mode })
    }

    pub fn create_window(&self, rect: Rect, mode: GraphicsMode, shadow: i32) -> Result<DrawableId> {
        self.call_created(GraphicsRequest::CreateWindow { rect, mode, shadow })
    }

    pub fn close(&self, id: DrawableId) -> Result<()> {
        self.call_done(GraphicsRequest::Close(id))
    }

    pub fn set_visibility(&self, id: DrawableId, visible: bool) -> Result<()> {
        self.call_done(GraphicsRequest::SetVisibility { id, visible })
    }

    pub fn order(&self, id: DrawableId, position: i32) -> Result<()> {
        self.call_done(GraphicsRequest::Order { id, position })
    }

    pub fn set_win(&self, id: DrawableId, position: Point, size: Option<Size>) -> Result<()> {
        self.call_done(GraphicsRequest::SetWin { id, position, size })
    }

    /// Fails with `WindowServerError::SpriteMigration` when `slot` is bound
    /// to another window.
    pub fn sprite(&self, window: DrawableId, slot: u32, sprite: Option<Sprite>) -> Result<()> {
        self.call_done(GraphicsRequest::Sprite {
            window,
            slot,
            sprite,
        })
    }

    pub fn clock(&self, id: DrawableId, info: Option<ClockInfo>) -> Result<()> {
        self.call_done(GraphicsRequest::Clock { id, info })
    }

    pub fn cursor(&self, spec: Option<CursorSpec>) -> Result<()> {
        self.call_done(GraphicsRequest::Cursor(spec))
    }

    pub fn busy(&self, id: Option<DrawableId>, delay: Duration) -> Result<()> {
        self.call_done(GraphicsRequest::Busy { id, delay })
    }

    pub fn info_print(&self, id: Option<DrawableId>) -> Result<()> {
        self.call_done(GraphicsRequest::InfoPrint(id))
    }

    pub fn draw(&self, commands: Vec<DrawCommand>) -> Result<()> {
        self.call_done(GraphicsRequest::Draw(commands))
    }

    pub fn peek_line(
        &self,
        id: DrawableId,
        position: Point,
        count: usize,
        mode: GraphicsMode,
    ) -> Result<Vec<u8>> {
        match self.call(GraphicsRequest::PeekLine {
            id,
            position,
            count,
            mode,
        })? {
            GraphicsResponse::Bytes(bytes) => Ok(bytes),
            other => Err(unexpected(other)),
        }
    }

    pub fn screenshot(&self) -> Result<Surface> {
        match self.call(GraphicsRequest::Screenshot)? {
            GraphicsResponse::Screenshot(surface) => Ok(surface),
            other => Err(unexpected(other)),
        }
    }

    pub fn drawable_info(&self, id: DrawableId) -> Result<Option<DrawableInfo>> {
        match self.call(GraphicsRequest::DrawableInfo(id))? {
            GraphicsResponse::Info(info) => Ok(info),
            other => Err(unexpected(other)),
        }
    }

    /// Open windows, frontmost first.
    pub fn window_order(&self) -> Result<Vec<DrawableId>> {
        match self.call(GraphicsRequest::WindowOrder)? {
            GraphicsResponse::Order(order) => Ok(order),
            other => Err(unexpected(other)),
        }
    }

    pub fn clock_face(&self, id: DrawableId) -> Result<Option<ClockFace>> {
        match self.call(GraphicsRequest::ClockFace(id))? {
            GraphicsResponse::ClockFace(face) => Ok(face),
            other => Err(unexpected(other)),
        }
    }
}
