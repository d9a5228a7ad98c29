// src/main.rs

//! Headless host for the OPL runtime.
//!
//! Runs a short scripted "program" on an interpreter thread against a
//! synthetic input source, then shuts down. Set `OPL_HOST_CONFIG` to a JSON
//! configuration file to override the defaults.

use anyhow::{anyhow, Context, Result};
use log::{error, info};
use opl_host::color::Color;
use opl_host::config::Config;
use opl_host::graphics::{
    DrawCommand, DrawKind, DrawableId, FontUid, GraphicsMode, Image, Point, Rect, Size,
};
use opl_host::keys::{KeySymbol, Modifiers};
use opl_host::producers::SoundData;
use opl_host::scheduler::RequestHandle;
use opl_host::window_server::{ClockInfo, ClockMode};
use opl_host::{AsyncRequest, Completion, Runtime};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

/// A one-second 440 Hz tone at 8 kHz.
fn tone() -> SoundData {
    let samples = (0..8000)
        .map(|i| {
            let t = i as f64 / 8000.0;
            ((t * 440.0 * std::f64::consts::TAU).sin() * 8000.0) as i16
        })
        .collect();
    SoundData::from_pcm(8000, samples)
}

/// Waits for `handle`. `None` means the host interrupted the program.
fn wait(runtime: &Runtime, handle: RequestHandle) -> Option<Completion> {
    let (completion, earlier) = runtime.wait_for(handle);
    let interrupted = completion == Completion::Interrupted
        || earlier.iter().any(|(_, c)| *c == Completion::Interrupted);
    (!interrupted).then_some(completion)
}

/// The scripted program: open a window, draw, print, sleep, read a key,
/// play a tone, then wait to be interrupted.
fn run_program(runtime: &Runtime) -> Result<()> {
    let graphics = runtime.graphics();

    let window = graphics.create_window(Rect::new(20, 20, 200, 80), GraphicsMode::Gray16, 2)?;
    let checker = (0..64)
        .map(|i| if (i / 8 + i % 8) % 2 == 0 { 0x000000 } else { 0xffffff })
        .collect();
    graphics.draw(vec![
        DrawCommand::new(window, Point::new(10, 10), DrawKind::Box { size: Size::new(180, 60) })
            .with_pen_width(2),
        DrawCommand::new(window, Point::new(100, 40), DrawKind::Circle { radius: 20, filled: true })
            .with_color(Color::gray(96)),
        DrawCommand::new(
            window,
            Point::new(20, 20),
            DrawKind::Bitblt {
                image: Image::new(Size::new(8, 8), checker),
            },
        ),
    ])?;
    graphics.set_visibility(window, true)?;
    graphics.clock(
        DrawableId::DEFAULT_WINDOW,
        Some(ClockInfo {
            mode: ClockMode::Digital,
            position: Point::new(580, 4),
        }),
    )?;

    let info = graphics.create_window(Rect::new(400, 200, 200, 20), GraphicsMode::Gray4, 0)?;
    graphics.info_print(Some(info))?;
    let (size, _) = runtime.text_size("Press a key", FontUid::ARIAL_NORMAL_15);
    info!("Program: prompt measures {}x{}", size.width, size.height);

    let sleep = runtime.request(AsyncRequest::Sleep(Duration::from_millis(200)))?;
    let Some(completion) = wait(runtime, sleep) else {
        return Ok(());
    };
    info!("Program: slept, status {}", completion.status());

    let key = runtime.request(AsyncRequest::NextKeypress)?;
    match wait(runtime, key) {
        Some(Completion::Event(record)) => info!("Program: got key code {}", record.event_type()),
        Some(other) => return Err(anyhow!("expected a key press, got {:?}", other)),
        None => return Ok(()),
    }

    let sound = runtime.request(AsyncRequest::PlaySound(tone()))?;
    let Some(completion) = wait(runtime, sound) else {
        return Ok(());
    };
    info!("Program: sound finished, status {}", completion.status());

    let order = graphics.window_order()?;
    info!("Program: windows front to back {:?}", order);

    // Park on an input request until the host interrupts us.
    runtime.request(AsyncRequest::NextEvent)?;
    loop {
        match runtime.wait_for_any().1 {
            Completion::Interrupted => return Ok(()),
            Completion::Event(record) => info!("Program: event {:#x}", record.event_type()),
            other => info!("Program: completion {:?}", other),
        }
    }
}

fn main() -> Result<()> {
    // Initialize the logger. Default filter is "info" if RUST_LOG is not set.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_micros()
        .init();

    info!("Starting opl-host...");

    let config_path = std::env::var_os("OPL_HOST_CONFIG").map(PathBuf::from);
    let config = Config::load_or_default(config_path.as_deref());

    let poll = config.scheduler.wait_poll();
    let runtime = Runtime::new(config).context("Failed to build runtime")?;
    let input = runtime.input_sender();
    let interrupter = runtime.interrupter();

    let interpreter = thread::Builder::new()
        .name("interpreter".to_string())
        .spawn(move || {
            let result = run_program(&runtime);
            runtime.shutdown();
            result
        })
        .context("Failed to spawn interpreter thread")?;

    // Synthetic input: one keystroke once the program is waiting for it.
    thread::sleep(Duration::from_millis(500));
    input.key_down(KeySymbol::Shift, Modifiers::SHIFT);
    input.type_key(KeySymbol::Char('Y'), Modifiers::SHIFT);
    input.key_up(KeySymbol::Shift, Modifiers::empty());

    // Give the program time to play its tone, then interrupt it.
    let deadline = Instant::now() + Duration::from_millis(1500);
    while !interpreter.is_finished() && Instant::now() < deadline {
        thread::sleep(poll);
    }
    interrupter.interrupt();

    match interpreter.join() {
        Ok(Ok(())) => {
            info!("opl-host finished.");
            Ok(())
        }
        Ok(Err(e)) => {
            error!("Program failed: {:#}", e);
            Err(e)
        }
        Err(_) => Err(anyhow!("interpreter thread panicked")),
    }
}
