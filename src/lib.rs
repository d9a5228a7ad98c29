// src/lib.rs
//! Runtime services for running OPL programs on a host.
//!
//! The interpreter thread drives everything through `runtime::Runtime`:
//! asynchronous requests (input, timers, sound) are tracked by the
//! `scheduler`, completed by the `input` queue and the `producers`, and
//! drawing goes to the `window_server` actor.

pub mod color;
pub mod config;
pub mod graphics;
pub mod input;
pub mod keys;
pub mod producers;
pub mod runtime;
pub mod scheduler;
pub mod window_server;

pub use runtime::{AsyncRequest, Completion, EventRecord, Runtime};
