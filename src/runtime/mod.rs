// src/runtime/mod.rs
//! The interpreter bridge.
//!
//! `Runtime` is what the interpreter thread calls. It issues asynchronous
//! requests to the scheduler and wires each one to its producer (input
//! queue, timer, sound worker), waits for completions and decodes them into
//! `Completion` values, and exposes the window server for synchronous
//! graphics calls.
//!
//! Only the interpreter thread issues, cancels and waits. Hosts feed input
//! through an `InputSender` and stop a blocked interpreter with an
//! `Interrupter`; both can be used from any thread.

pub mod event_record;

pub use event_record::{Completion, EventRecord, STATUS_CANCELLED};

use crate::config::Config;
use crate::graphics::{DrawableId, FontMetrics, FontUid, Size};
use crate::input::{ConsumerKind, InputQueue, InputSender};
use crate::keys::KeySymbol;
use crate::producers::{sound, timer, AudioSink, NullSink, SinkFactory, SoundData};
use crate::scheduler::{RequestHandle, RequestKind, Scheduler};
use crate::window_server::{WindowServer, WindowServerHandle};
use anyhow::{Context, Result};
use log::*;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// An asynchronous request and its payload.
#[derive(Debug, Clone)]
pub enum AsyncRequest {
    NextEvent,
    NextKeypress,
    Sleep(Duration),
    SleepUntil(SystemTime),
    PlaySound(SoundData),
}

impl AsyncRequest {
    pub fn kind(&self) -> RequestKind {
        match self {
            AsyncRequest::NextEvent => RequestKind::NextEvent,
            AsyncRequest::NextKeypress => RequestKind::NextKeypress,
            AsyncRequest::Sleep(_) => RequestKind::Sleep,
            AsyncRequest::SleepUntil(_) => RequestKind::SleepUntil,
            AsyncRequest::PlaySound(_) => RequestKind::PlaySound,
        }
    }
}

/// Wakes a blocked interpreter from another thread.
#[derive(Clone)]
pub struct Interrupter {
    scheduler: Arc<Scheduler>,
}

impl Interrupter {
    pub fn interrupt(&self) -> RequestHandle {
        self.scheduler.interrupt()
    }
}

pub struct Runtime {
    config: Config,
    scheduler: Arc<Scheduler>,
    input: Arc<InputQueue>,
    graphics: WindowServerHandle,
    sink_factory: SinkFactory,
    // Joins the actor thread on drop.
    _window_server: WindowServer,
}

impl Runtime {
    /// Builds a runtime that plays sound into a `NullSink`.
    pub fn new(config: Config) -> Result<Self> {
        let pacing = config.audio.real_time_pacing;
        let factory: SinkFactory =
            Arc::new(move || Box::new(NullSink::new(pacing)) as Box<dyn AudioSink>);
        Self::with_sink_factory(config, factory)
    }

    pub fn with_sink_factory(config: Config, sink_factory: SinkFactory) -> Result<Self> {
        let window_server =
            WindowServer::spawn(&config).context("Failed to start the window server")?;
        info!(
            "Runtime: started with a {}x{} {:?} screen",
            config.screen.width, config.screen.height, config.screen.mode
        );
        Ok(Runtime {
            graphics: window_server.handle(),
            scheduler: Scheduler::new(),
            input: InputQueue::new(),
            sink_factory,
            config,
            _window_server: window_server,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Synchronous graphics and window operations.
    pub fn graphics(&self) -> &WindowServerHandle {
        &self.graphics
    }

    pub fn input_sender(&self) -> InputSender {
        InputSender::new(Arc::clone(&self.input))
    }

    pub fn interrupter(&self) -> Interrupter {
        Interrupter {
            scheduler: Arc::clone(&self.scheduler),
        }
    }

    /// Issues an asynchronous request. Fails only when an input request is
    /// already outstanding.
    pub fn request(&self, request: AsyncRequest) -> Result<RequestHandle> {
        let kind = request.kind();
        let handle = match request {
            AsyncRequest::NextEvent => self.claim_input(kind, ConsumerKind::NextEvent),
            AsyncRequest::NextKeypress => self.claim_input(kind, ConsumerKind::NextKeypress),
            AsyncRequest::Sleep(interval) => self
                .scheduler
                .add_pending_request(kind, move |c| timer::sleep_for(c, interval)),
            AsyncRequest::SleepUntil(deadline) => self
                .scheduler
                .add_pending_request(kind, move |c| timer::sleep_until(c, deadline)),
            AsyncRequest::PlaySound(mut data) => {
                if data.sample_rate == 0 {
                    data.sample_rate = self.config.audio.sample_rate;
                }
                let sink = (self.sink_factory)();
                let chunk_frames = self.config.audio.chunk_frames;
                self.scheduler.add_pending_request(kind, move |c| {
                    sound::play(c, data, sink, chunk_frames)
                })
            }
        }
        .with_context(|| format!("Failed to issue {:?} request", kind))?;
        debug!("Runtime: issued {} ({:?})", handle, kind);
        Ok(handle)
    }

    fn claim_input(
        &self,
        kind: RequestKind,
        consumer: ConsumerKind,
    ) -> Result<RequestHandle, crate::scheduler::SchedulerError> {
        let input = Arc::clone(&self.input);
        self.scheduler
            .add_pending_request(kind, move |c| input.claim(consumer, c))
    }

    /// Cancels a request. Its completion still arrives, as `Cancelled`.
    pub fn cancel(&self, handle: RequestHandle) {
        self.scheduler.cancel_request(handle);
    }

    /// Blocks until any request completes.
    pub fn wait_for_any(&self) -> (RequestHandle, Completion) {
        let (handle, response) = self.scheduler.wait_for_any();
        (handle, Completion::from_response(&response))
    }

    pub fn wait_for_any_timeout(&self, timeout: Duration) -> Option<(RequestHandle, Completion)> {
        self.scheduler
            .wait_for_any_timeout(timeout)
            .map(|(handle, response)| (handle, Completion::from_response(&response)))
    }

    /// Returns a completion if one is ready, without blocking.
    pub fn poll(&self) -> Option<(RequestHandle, Completion)> {
        self.scheduler
            .any_request()
            .map(|(handle, response)| (handle, Completion::from_response(&response)))
    }

    /// Blocks until `handle` completes. Other completions that arrive first
    /// are returned in the second element, in completion order. `handle`
    /// must not have been consumed already.
    pub fn wait_for(&self, handle: RequestHandle) -> (Completion, Vec<(RequestHandle, Completion)>) {
        let mut others = Vec::new();
        loop {
            let (done, completion) = self.wait_for_any();
            if done == handle {
                return (completion, others);
            }
            others.push((done, completion));
        }
    }

    pub fn is_key_down(&self, key: KeySymbol) -> bool {
        self.input.is_key_down(key)
    }

    pub fn held_keys(&self) -> [u8; 32] {
        self.input.held_keys()
    }

    pub fn flush_input(&self) {
        self.input.flush();
    }

    pub fn pending_events(&self) -> usize {
        self.input.pending_events()
    }

    /// Shows or hides the busy overlay; without a delay the configured
    /// default applies.
    pub fn busy(&self, id: Option<DrawableId>, delay: Option<Duration>) -> Result<()> {
        let delay = delay.unwrap_or_else(|| self.config.overlays.default_busy_delay());
        self.graphics.busy(id, delay)
    }

    pub fn text_size(&self, text: &str, font: FontUid) -> (Size, i32) {
        FontMetrics::for_uid(font).text_size(text)
    }

    /// Cancels every outstanding request and stops the window server.
    pub fn shutdown(self) {
        let outstanding = self.scheduler.outstanding();
        info!(
            "Runtime: shutting down, cancelling {} outstanding requests",
            outstanding.len()
        );
        for handle in outstanding {
            self.scheduler.cancel_request(handle);
        }
    }
}

#[cfg(test)]
mod tests;
