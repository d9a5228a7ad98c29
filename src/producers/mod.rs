// src/producers/mod.rs
//! Completion producers: the actors that finish timer and sound requests.
//!
//! Each producer is a function that takes the request's `Completer`, arms
//! itself, and returns the `CancelHook` that stops it. Input requests are
//! completed by the `input` module.

pub mod sound;
pub mod timer;

pub use sound::{AudioSink, NullSink, RecordingSink, SinkFactory, SoundData};
