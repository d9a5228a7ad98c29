// src/input/tests.rs

use super::*;
use crate::graphics::{DrawableId, Point};
use crate::scheduler::{RequestKind, Scheduler};

struct Fixture {
    scheduler: Arc<Scheduler>,
    queue: Arc<InputQueue>,
    input: InputSender,
}

impl Fixture {
    fn new() -> Self {
        let queue = InputQueue::new();
        Fixture {
            scheduler: Scheduler::new(),
            input: InputSender::new(Arc::clone(&queue)),
            queue,
        }
    }

    fn request(&self, kind: ConsumerKind) -> RequestHandle {
        let request_kind = match kind {
            ConsumerKind::NextEvent => RequestKind::NextEvent,
            ConsumerKind::NextKeypress => RequestKind::NextKeypress,
        };
        let queue = Arc::clone(&self.queue);
        self.scheduler
            .add_pending_request(request_kind, move |completer| queue.claim(kind, completer))
            .unwrap()
    }
}

fn key_of(response: &Response) -> Option<KeySymbol> {
    match response {
        Response::KeyDown(e) | Response::KeyUp(e) | Response::KeyPress { event: e, .. } => {
            Some(e.key)
        }
        _ => None,
    }
}

#[test]
fn buffered_events_are_claimed_in_fifo_order() {
    let f = Fixture::new();
    f.input.key_down(KeySymbol::Char('a'), Modifiers::empty());
    f.input.foreground();

    let first = f.request(ConsumerKind::NextEvent);
    let (handle, response) = f.scheduler.any_request().unwrap();
    assert_eq!(handle, first);
    assert!(matches!(response, Response::KeyDown(_)));

    f.request(ConsumerKind::NextEvent);
    let (_, response) = f.scheduler.any_request().unwrap();
    assert!(matches!(response, Response::Foreground { .. }));
    assert_eq!(f.queue.pending_events(), 0);
}

#[test]
fn consumer_waits_for_later_input() {
    let f = Fixture::new();
    let handle = f.request(ConsumerKind::NextEvent);
    assert_eq!(f.scheduler.any_request(), None);
    assert!(f.queue.has_consumer());

    f.input.quit();
    let (done, response) = f.scheduler.any_request().unwrap();
    assert_eq!(done, handle);
    assert!(matches!(response, Response::Quit { .. }));
    assert!(!f.queue.has_consumer());
}

#[test_log::test]
fn keypress_consumer_discards_events_without_charcode() {
    let f = Fixture::new();
    // A: modifier-only key down. B: 'x' key press.
    f.input.key_down(KeySymbol::Shift, Modifiers::SHIFT);
    f.input.key_press(KeySymbol::Char('x'), Modifiers::empty(), false);

    let handle = f.request(ConsumerKind::NextKeypress);
    let (done, response) = f.scheduler.any_request().unwrap();
    assert_eq!(done, handle);
    assert_eq!(response.charcode(), Some('x' as u32));
    // A was dropped, not re-queued.
    assert_eq!(f.queue.pending_events(), 0);
}

#[test]
fn keypress_consumer_keeps_waiting_after_draining_non_matching_events() {
    let f = Fixture::new();
    f.input.key_down(KeySymbol::Up, Modifiers::empty());
    f.input.key_press(KeySymbol::Up, Modifiers::empty(), false);

    f.request(ConsumerKind::NextKeypress);
    assert_eq!(f.scheduler.any_request(), None);
    assert_eq!(f.queue.pending_events(), 0);

    f.input.type_key(KeySymbol::Char('q'), Modifiers::empty());
    let (_, response) = f.scheduler.any_request().unwrap();
    assert_eq!(key_of(&response), Some(KeySymbol::Char('q')));
    // The trailing key up stays buffered for the next consumer.
    assert_eq!(f.queue.pending_events(), 1);
}

#[test]
fn cancelled_consumer_leaves_new_events_buffered() {
    let f = Fixture::new();
    let handle = f.request(ConsumerKind::NextEvent);
    f.scheduler.cancel_request(handle);
    assert_eq!(f.scheduler.any_request(), Some((handle, Response::Cancelled)));
    assert!(!f.queue.has_consumer());

    f.input.background();
    assert_eq!(f.queue.pending_events(), 1);
    assert_eq!(f.scheduler.any_request(), None);
}

#[test]
fn held_keys_follow_down_and_up_independent_of_consumption() {
    let f = Fixture::new();
    f.input.key_down(KeySymbol::Char('a'), Modifiers::empty());
    f.input.key_down(KeySymbol::Shift, Modifiers::SHIFT);
    assert!(f.queue.is_key_down(KeySymbol::Char('a')));

    let map = f.queue.held_keys();
    assert_ne!(map[(b'A' / 8) as usize] & (1 << (b'A' % 8)), 0);
    assert_ne!(map[0x12 / 8] & (1 << (0x12 % 8)), 0);

    f.queue.flush();
    assert!(f.queue.is_key_down(KeySymbol::Char('a')));

    f.input.key_up(KeySymbol::Char('a'), Modifiers::empty());
    assert!(!f.queue.is_key_down(KeySymbol::Char('a')));
    assert!(f.queue.is_key_down(KeySymbol::Shift));
}

#[test]
fn key_released_under_another_symbol_is_no_longer_held() {
    let f = Fixture::new();
    f.input.key_down(KeySymbol::Char('a'), Modifiers::empty());
    f.input.key_down(KeySymbol::Shift, Modifiers::SHIFT);
    f.input.key_up(KeySymbol::Char('A'), Modifiers::SHIFT);
    assert!(!f.queue.is_key_down(KeySymbol::Char('a')));
    assert_eq!(f.queue.held_keys()[(b'A' / 8) as usize] & (1 << (b'A' % 8)), 0);

    f.input.key_up(KeySymbol::Shift, Modifiers::empty());
    assert_eq!(f.queue.held_keys(), [0u8; 32]);
}

#[test]
fn keys_without_scan_code_are_not_held() {
    let f = Fixture::new();
    f.input.key_down(KeySymbol::Unknown, Modifiers::empty());
    f.input.key_down(KeySymbol::Char('€'), Modifiers::empty());
    assert!(!f.queue.is_key_down(KeySymbol::Unknown));
    assert_eq!(f.queue.held_keys(), [0u8; 32]);
}

#[test]
fn pen_events_carry_window_and_position() {
    let f = Fixture::new();
    let pen = PenEvent {
        timestamp: Timestamp::default(),
        window: DrawableId(3),
        position: Point::new(4, 5),
        screen_position: Point::new(14, 15),
        modifiers: Modifiers::empty(),
    };
    f.input.pen(PenAction::Drag, pen);
    f.request(ConsumerKind::NextEvent);
    match f.scheduler.any_request() {
        Some((_, Response::PenDrag(event))) => {
            assert_eq!(event.window, DrawableId(3));
            assert_eq!(event.position, Point::new(4, 5));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn modifier_key_press_is_not_delivered() {
    let f = Fixture::new();
    f.input.key_press(KeySymbol::Control, Modifiers::CONTROL, false);
    assert_eq!(f.queue.pending_events(), 0);
}
