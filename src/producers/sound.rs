// src/producers/sound.rs
//! Sound playback for play-sound requests.
//!
//! Playback runs on a dedicated worker that feeds the buffer to an
//! `AudioSink` chunk by chunk. Cancellation raises a token the render loop
//! checks between chunks; it never waits for the worker. Device failures
//! complete the request as if playback had finished.

use crate::scheduler::{CancelHook, Completer, Response};
use anyhow::{Context, Result};
use log::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

/// 16-bit mono PCM ready for playback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoundData {
    pub sample_rate: u32,
    pub samples: Arc<[i16]>,
}

impl SoundData {
    pub fn from_pcm(sample_rate: u32, samples: Vec<i16>) -> Self {
        SoundData {
            sample_rate,
            samples: samples.into(),
        }
    }

    /// Decodes G.711 A-law, the format of EPOC sound files.
    pub fn from_alaw(sample_rate: u32, bytes: &[u8]) -> Self {
        Self::from_pcm(sample_rate, bytes.iter().map(|b| alaw_to_linear(*b)).collect())
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

fn alaw_to_linear(value: u8) -> i16 {
    let a = value ^ 0x55;
    let segment = (a >> 4) & 0x07;
    let mut t = ((a & 0x0f) as i32) << 4;
    t = match segment {
        0 => t + 8,
        1 => t + 0x108,
        _ => (t + 0x108) << (segment - 1),
    };
    (if a & 0x80 != 0 { t } else { -t }) as i16
}

/// Output device abstraction.
pub trait AudioSink: Send {
    fn open(&mut self, sample_rate: u32) -> Result<()>;

    fn write(&mut self, samples: &[i16]) -> Result<()>;

    /// Blocks until everything written has been played.
    fn drain(&mut self) -> Result<()>;
}

/// Creates a fresh sink for each play-sound request.
pub type SinkFactory = Arc<dyn Fn() -> Box<dyn AudioSink> + Send + Sync>;

/// Discards samples. With pacing enabled each write takes as long as the
/// samples would take to play, so requests complete on schedule.
pub struct NullSink {
    pacing: bool,
    sample_rate: u32,
}

impl NullSink {
    pub fn new(pacing: bool) -> Self {
        NullSink {
            pacing,
            sample_rate: 0,
        }
    }
}

impl AudioSink for NullSink {
    fn open(&mut self, sample_rate: u32) -> Result<()> {
        self.sample_rate = sample_rate;
        Ok(())
    }

    fn write(&mut self, samples: &[i16]) -> Result<()> {
        if self.pacing && self.sample_rate > 0 {
            thread::sleep(Duration::from_secs_f64(
                samples.len() as f64 / self.sample_rate as f64,
            ));
        }
        Ok(())
    }

    fn drain(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Keeps every written sample; shares its buffer with clones.
#[derive(Clone, Default)]
pub struct RecordingSink {
    samples: Arc<Mutex<Vec<i16>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> Vec<i16> {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AudioSink for RecordingSink {
    fn open(&mut self, _sample_rate: u32) -> Result<()> {
        Ok(())
    }

    fn write(&mut self, samples: &[i16]) -> Result<()> {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(samples);
        Ok(())
    }

    fn drain(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Starts playing `sound` into `sink` and returns the hook that stops it.
pub fn play(
    completer: Completer,
    sound: SoundData,
    sink: Box<dyn AudioSink>,
    chunk_frames: usize,
) -> CancelHook {
    let handle = completer.handle();
    let completer = Arc::new(completer);
    let cancelled = Arc::new(AtomicBool::new(false));

    let worker_completer = Arc::clone(&completer);
    let worker_cancelled = Arc::clone(&cancelled);
    let spawned = thread::Builder::new()
        .name(format!("opl-sound-{}", handle.value()))
        .spawn(move || {
            match render(sink, &sound, chunk_frames.max(1), &worker_cancelled) {
                Ok(true) => debug!("Sound: {} finished", handle),
                Ok(false) => {
                    debug!("Sound: {} stopped", handle);
                    return;
                }
                Err(e) => warn!("Sound: playback of {} failed: {:#}", handle, e),
            }
            worker_completer.complete(Response::Completed);
        });

    match spawned {
        Ok(_) => Box::new(move || cancelled.store(true, Ordering::Release)),
        Err(e) => {
            warn!("Sound: failed to spawn playback thread for {}: {}", handle, e);
            completer.complete(Response::Completed);
            Box::new(|| {})
        }
    }
}

/// The render loop. Returns Ok(false) when cancelled.
fn render(
    mut sink: Box<dyn AudioSink>,
    sound: &SoundData,
    chunk_frames: usize,
    cancelled: &AtomicBool,
) -> Result<bool> {
    sink.open(sound.sample_rate)
        .context("failed to open audio device")?;
    for chunk in sound.samples.chunks(chunk_frames) {
        if cancelled.load(Ordering::Acquire) {
            return Ok(false);
        }
        sink.write(chunk).context("audio device write failed")?;
    }
    if cancelled.load(Ordering::Acquire) {
        return Ok(false);
    }
    sink.drain().context("audio device drain failed")?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{RequestKind, Scheduler};

    struct BrokenSink;

    impl AudioSink for BrokenSink {
        fn open(&mut self, _sample_rate: u32) -> Result<()> {
            anyhow::bail!("no audio device")
        }

        fn write(&mut self, _samples: &[i16]) -> Result<()> {
            Ok(())
        }

        fn drain(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn alaw_decodes_smallest_magnitudes() {
        assert_eq!(alaw_to_linear(0xd5), 8);
        assert_eq!(alaw_to_linear(0x55), -8);
        assert_eq!(alaw_to_linear(0xaa), 32256);
    }

    #[test]
    fn plays_every_sample_then_completes() {
        let scheduler = Scheduler::new();
        let sink = RecordingSink::new();
        let sound = SoundData::from_pcm(8000, (0..1000).collect());
        let device = sink.clone();
        let handle = scheduler
            .add_pending_request(RequestKind::PlaySound, move |c| {
                play(c, sound, Box::new(device), 64)
            })
            .unwrap();

        assert_eq!(
            scheduler.wait_for_any_timeout(Duration::from_secs(5)),
            Some((handle, Response::Completed))
        );
        assert_eq!(sink.samples().len(), 1000);
    }

    #[test]
    fn cancelled_playback_completes_once_as_cancelled() {
        let scheduler = Scheduler::new();
        // Two seconds of silence, paced in real time.
        let sound = SoundData::from_pcm(8000, vec![0; 16000]);
        let handle = scheduler
            .add_pending_request(RequestKind::PlaySound, move |c| {
                play(c, sound, Box::new(NullSink::new(true)), 256)
            })
            .unwrap();
        thread::sleep(Duration::from_millis(50));
        scheduler.cancel_request(handle);

        assert_eq!(scheduler.wait_for_any(), (handle, Response::Cancelled));
        thread::sleep(Duration::from_millis(100));
        assert_eq!(scheduler.any_request(), None);
    }

    #[test_log::test]
    fn device_failure_completes_request() {
        let scheduler = Scheduler::new();
        let sound = SoundData::from_pcm(8000, vec![0; 10]);
        let handle = scheduler
            .add_pending_request(RequestKind::PlaySound, move |c| {
                play(c, sound, Box::new(BrokenSink), 256)
            })
            .unwrap();
        assert_eq!(
            scheduler.wait_for_any_timeout(Duration::from_secs(5)),
            Some((handle, Response::Completed))
        );
    }

    #[test]
    fn duration_follows_sample_rate() {
        let sound = SoundData::from_pcm(8000, vec![0; 4000]);
        assert_eq!(sound.duration(), Duration::from_millis(500));
    }
}
