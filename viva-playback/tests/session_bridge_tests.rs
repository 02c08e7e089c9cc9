//! Integration tests for SessionBridge
//!
//! Producer-side delivery through the event channel and the pump loop.

mod helpers;

use helpers::{pcm, playing_controller, test_track};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use viva_common::PlaybackState;
use viva_playback::playback::FrameDelivery;
use viva_playback::SessionEvent;

#[test]
fn test_pump_delivers_frames_and_lifecycle() {
    let track = test_track(60);
    let (controller, _session) = playing_controller(&track);
    let bridge = controller.session_bridge();
    let generation = bridge.current_generation();

    let (tx, rx) = mpsc::channel();
    for _ in 0..4 {
        tx.send(SessionEvent::FrameAvailable {
            data: pcm(256, 9),
            generation,
        })
        .unwrap();
    }
    drop(tx);

    bridge.pump(rx);

    assert_eq!(controller.buffer_stats().occupied, 4 * 256 * 4);
    assert_eq!(controller.buffer_stats().last_sequence, 3);
}

#[test]
fn test_pump_applies_track_end() {
    let track = test_track(60);
    let (controller, _session) = playing_controller(&track);
    let bridge = controller.session_bridge();

    let (tx, rx) = mpsc::channel();
    tx.send(SessionEvent::TrackEnded).unwrap();
    drop(tx);
    bridge.pump(rx);

    assert_eq!(controller.state(), PlaybackState::Idle);
}

#[test]
fn test_pump_retries_on_backpressure_until_drained() {
    let track = test_track(60);
    let (controller, _session) = playing_controller(&track);
    let bridge = controller.session_bridge();
    let render = controller.render_bridge();
    let generation = bridge.current_generation();

    // Fill the buffer completely
    let capacity = controller.buffer_stats().capacity;
    assert_eq!(bridge.on_frame_available(vec![0; capacity], generation), FrameDelivery::Accepted { bytes: capacity });

    let (tx, rx) = mpsc::channel();
    tx.send(SessionEvent::FrameAvailable {
        data: pcm(100, 4),
        generation,
    })
    .unwrap();
    drop(tx);

    let pump_bridge = controller.session_bridge();
    let pump = thread::spawn(move || pump_bridge.pump(rx));

    // The pending chunk fits once the render side drains some audio
    thread::sleep(Duration::from_millis(20));
    let mut out = pcm(1000, 0);
    render.render(&mut out, 1000);

    pump.join().unwrap();
    assert_eq!(controller.buffer_stats().occupied, capacity - 4000 + 400);
    assert!(controller.buffer_stats().overflows > 0);
}

#[test]
fn test_pump_gives_up_when_buffer_closes() {
    let track = test_track(60);
    let (controller, _session) = playing_controller(&track);
    let bridge = controller.session_bridge();
    let generation = bridge.current_generation();

    let capacity = controller.buffer_stats().capacity;
    bridge.on_frame_available(vec![0; capacity], generation);

    let (tx, rx) = mpsc::channel();
    tx.send(SessionEvent::FrameAvailable {
        data: pcm(100, 4),
        generation,
    })
    .unwrap();
    drop(tx);

    let pump_bridge = controller.session_bridge();
    let pump = thread::spawn(move || pump_bridge.pump(rx));

    thread::sleep(Duration::from_millis(20));
    controller.stop();

    pump.join().unwrap();
    assert_eq!(controller.buffer_stats().occupied, 0);
}

#[test]
fn test_handle_drops_chunk_on_backpressure() {
    let track = test_track(60);
    let (controller, _session) = playing_controller(&track);
    let bridge = controller.session_bridge();
    let generation = bridge.current_generation();

    let capacity = controller.buffer_stats().capacity;
    bridge.handle(SessionEvent::FrameAvailable {
        data: vec![0; capacity],
        generation,
    });
    bridge.handle(SessionEvent::FrameAvailable {
        data: pcm(1, 0),
        generation,
    });

    let stats = controller.buffer_stats();
    assert_eq!(stats.occupied, capacity);
    assert_eq!(stats.overflows, 1);
}

#[test]
fn test_session_reported_track_mismatch_still_starts() {
    let track = test_track(60);
    let (controller, session) = playing_controller(&track);
    session.set_current_track(Some(test_track(10)));

    let next = test_track(90);
    controller.session_bridge().on_track_started(next.clone());

    assert_eq!(controller.current_track(), Some(next));
}
