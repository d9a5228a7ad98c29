// src/runtime/tests.rs

use super::*;
use crate::graphics::{GraphicsMode, Rect};
use crate::keys::Modifiers;
use crate::producers::RecordingSink;
use std::thread;

fn quiet_config() -> Config {
    let mut config = Config::default();
    config.audio.real_time_pacing = false;
    config
}

#[test]
fn keypress_request_completes_with_event_record() {
    let runtime = Runtime::new(quiet_config()).unwrap();
    let input = runtime.input_sender();
    let handle = runtime.request(AsyncRequest::NextKeypress).unwrap();

    thread::spawn(move || input.type_key(KeySymbol::Char('z'), Modifiers::empty()));

    let (done, completion) = runtime.wait_for_any();
    assert_eq!(done, handle);
    match completion {
        Completion::Event(record) => assert_eq!(record.event_type(), 'z' as i32),
        other => panic!("unexpected {:?}", other),
    }
}

#[test_log::test]
fn second_input_request_is_rejected() {
    let runtime = Runtime::new(quiet_config()).unwrap();
    let first = runtime.request(AsyncRequest::NextEvent).unwrap();
    let err = runtime.request(AsyncRequest::NextKeypress).unwrap_err();
    assert!(err
        .downcast_ref::<crate::scheduler::SchedulerError>()
        .is_some());

    runtime.cancel(first);
    assert_eq!(runtime.poll(), Some((first, Completion::Cancelled)));
    assert!(runtime.request(AsyncRequest::NextKeypress).is_ok());
}

#[test]
fn cancelled_status_is_minus_48() {
    let runtime = Runtime::new(quiet_config()).unwrap();
    let handle = runtime
        .request(AsyncRequest::Sleep(Duration::from_secs(30)))
        .unwrap();
    runtime.cancel(handle);
    let (done, completion) = runtime.wait_for_any();
    assert_eq!(done, handle);
    assert_eq!(completion.status(), STATUS_CANCELLED);
}

#[test]
fn sleep_until_beats_longer_sleep() {
    let runtime = Runtime::new(quiet_config()).unwrap();
    let long = runtime
        .request(AsyncRequest::Sleep(Duration::from_millis(100)))
        .unwrap();
    let short = runtime
        .request(AsyncRequest::SleepUntil(
            SystemTime::now() + Duration::from_millis(50),
        ))
        .unwrap();

    let (completion, earlier) = runtime.wait_for(long);
    assert_eq!(completion, Completion::Completed);
    assert_eq!(earlier, vec![(short, Completion::Completed)]);
}

#[test]
fn sound_plays_into_configured_sink() {
    let sink = RecordingSink::new();
    let device = sink.clone();
    let factory: SinkFactory = Arc::new(move || Box::new(device.clone()) as Box<dyn AudioSink>);
    let runtime = Runtime::with_sink_factory(quiet_config(), factory).unwrap();

    let data = SoundData::from_alaw(0, &[0xd5; 300]);
    let handle = runtime.request(AsyncRequest::PlaySound(data)).unwrap();
    assert_eq!(
        runtime.wait_for_any_timeout(Duration::from_secs(5)),
        Some((handle, Completion::Completed))
    );
    assert_eq!(sink.samples(), vec![8; 300]);
}

#[test]
fn interrupter_wakes_blocked_wait() {
    let runtime = Runtime::new(quiet_config()).unwrap();
    let interrupter = runtime.interrupter();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        interrupter.interrupt();
    });
    let (_, completion) = runtime.wait_for_any();
    assert_eq!(completion, Completion::Interrupted);
}

#[test]
fn shutdown_cancels_outstanding_requests() {
    let runtime = Runtime::new(quiet_config()).unwrap();
    let scheduler = Arc::clone(runtime.scheduler());
    let handle = runtime.request(AsyncRequest::NextEvent).unwrap();
    runtime.shutdown();
    assert_eq!(
        scheduler.any_request(),
        Some((handle, crate::scheduler::Response::Cancelled))
    );
}

#[test]
fn busy_uses_default_delay() {
    let mut config = quiet_config();
    config.overlays.default_busy_delay_ms = 20;
    let runtime = Runtime::new(config).unwrap();
    let graphics = runtime.graphics();
    let w = graphics
        .create_window(Rect::new(0, 0, 40, 10), GraphicsMode::Gray4, 0)
        .unwrap();
    runtime.busy(Some(w), None).unwrap();
    assert!(!graphics.drawable_info(w).unwrap().unwrap().visible);
    thread::sleep(Duration::from_millis(150));
    assert!(graphics.drawable_info(w).unwrap().unwrap().visible);
}

#[test]
fn text_size_uses_font_metrics() {
    let runtime = Runtime::new(quiet_config()).unwrap();
    let (size, ascent) = runtime.text_size("abc", FontUid::ARIAL_NORMAL_15);
    assert_eq!(size, Size::new(24, 15));
    assert_eq!(ascent, 12);
}
