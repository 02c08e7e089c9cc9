//! Event emission and background monitoring tests

mod helpers;

use helpers::{config_with_capacity, controller_with, pcm, playing_controller, test_track};
use std::time::Duration;
use tokio::sync::broadcast;
use viva_common::{PlaybackEvent, PlaybackState};
use viva_playback::PlaybackConfig;

/// Wait for the first event matching `pred`
async fn expect_event<F>(rx: &mut broadcast::Receiver<PlaybackEvent>, pred: F) -> PlaybackEvent
where
    F: Fn(&PlaybackEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(e) => panic!("event channel closed: {}", e),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

#[tokio::test]
async fn test_track_started_emits_state_and_track_events() {
    let (controller, _session) = controller_with(config_with_capacity(4096));
    let mut rx = controller.subscribe_events();

    let track = test_track(200);
    controller.session_bridge().on_track_started(track.clone());

    match rx.recv().await.unwrap() {
        PlaybackEvent::StateChanged { old_state, new_state, .. } => {
            assert_eq!(old_state, PlaybackState::Idle);
            assert_eq!(new_state, PlaybackState::Playing);
        }
        other => panic!("expected StateChanged, got {}", other.event_type()),
    }
    match rx.recv().await.unwrap() {
        PlaybackEvent::TrackStarted {
            track_id,
            duration_ms,
            sample_rate,
            channels,
            ..
        } => {
            assert_eq!(track_id, track.id);
            assert_eq!(duration_ms, 200_000);
            assert_eq!(sample_rate, 44_100);
            assert_eq!(channels, 2);
        }
        other => panic!("expected TrackStarted, got {}", other.event_type()),
    }
}

#[tokio::test]
async fn test_seek_events() {
    let track = test_track(120);
    let (controller, session) = playing_controller(&track);
    let mut rx = controller.subscribe_events();

    controller.seek_to_secs(30.0).unwrap();
    let completed = expect_event(&mut rx, |e| matches!(e, PlaybackEvent::SeekCompleted { .. })).await;
    if let PlaybackEvent::SeekCompleted { track_id, position_ms, .. } = completed {
        assert_eq!(track_id, track.id);
        assert_eq!(position_ms, 30_000);
    }

    assert!(controller.seek_to_secs(-5.0).is_err());
    let rejected = expect_event(&mut rx, |e| matches!(e, PlaybackEvent::SeekRejected { .. })).await;
    if let PlaybackEvent::SeekRejected { requested_ms, .. } = rejected {
        assert_eq!(requested_ms, -5_000);
    }

    session.reject_seeks("not buffered");
    assert!(controller.seek_to_secs(60.0).is_err());
    let rejected = expect_event(&mut rx, |e| matches!(e, PlaybackEvent::SeekRejected { .. })).await;
    if let PlaybackEvent::SeekRejected { reason, .. } = rejected {
        assert_eq!(reason, "not buffered");
    }
}

#[tokio::test]
async fn test_track_ended_event_reports_position() {
    let track = test_track(120);
    let (controller, _session) = playing_controller(&track);
    controller.seek_to_secs(30.0).unwrap();
    let mut rx = controller.subscribe_events();

    controller.session_bridge().on_track_ended();

    let ended = expect_event(&mut rx, |e| matches!(e, PlaybackEvent::TrackEnded { .. })).await;
    if let PlaybackEvent::TrackEnded { track_id, position_ms, .. } = ended {
        assert_eq!(track_id, track.id);
        assert_eq!(position_ms, 30_000);
    }
}

#[tokio::test]
async fn test_session_error_event() {
    let track = test_track(120);
    let (controller, _session) = playing_controller(&track);
    let mut rx = controller.subscribe_events();

    controller.session_bridge().on_session_error("network unreachable");

    let event = expect_event(&mut rx, |e| matches!(e, PlaybackEvent::SessionError { .. })).await;
    if let PlaybackEvent::SessionError { reason, .. } = event {
        assert_eq!(reason, "network unreachable");
    }
}

#[tokio::test]
async fn test_monitor_reports_underrun_and_position() {
    let config = PlaybackConfig {
        monitor_interval_ms: 10,
        position_event_interval_ms: 20,
        underrun_grace_period_ms: 0,
        ..PlaybackConfig::default()
    };
    let (controller, _session) = controller_with(config);
    let track = test_track(120);
    controller.session_bridge().on_track_started(track.clone());

    let mut rx = controller.subscribe_events();
    let monitor = controller.start_monitoring(&tokio::runtime::Handle::current());

    // Empty buffer while Playing: a real underrun
    let mut out = pcm(512, 0);
    let outcome = controller.render_bridge().render(&mut out, 512);
    assert!(outcome.underrun);

    let underrun = expect_event(&mut rx, |e| matches!(e, PlaybackEvent::Underrun { .. })).await;
    if let PlaybackEvent::Underrun { underrun_count, .. } = underrun {
        assert_eq!(underrun_count, 1);
    }

    let position = expect_event(&mut rx, |e| matches!(e, PlaybackEvent::PlaybackPosition { .. })).await;
    if let PlaybackEvent::PlaybackPosition { track_id, playing, .. } = position {
        assert_eq!(track_id, track.id);
        assert!(playing);
    }

    monitor.shutdown().await;
}

#[tokio::test]
async fn test_monitor_reports_backpressure() {
    let config = PlaybackConfig {
        buffer_capacity_bytes: 1024,
        monitor_interval_ms: 10,
        ..PlaybackConfig::default()
    };
    let (controller, _session) = controller_with(config);
    controller.session_bridge().on_track_started(test_track(60));

    let mut rx = controller.subscribe_events();
    let monitor = controller.start_monitoring(&tokio::runtime::Handle::current());

    let bridge = controller.session_bridge();
    let generation = bridge.current_generation();
    bridge.on_frame_available(pcm(200, 1), generation);
    bridge.on_frame_available(pcm(200, 1), generation);

    let event = expect_event(&mut rx, |e| matches!(e, PlaybackEvent::Backpressure { .. })).await;
    if let PlaybackEvent::Backpressure {
        overflow_count,
        occupied_bytes,
        capacity_bytes,
        ..
    } = event
    {
        assert_eq!(overflow_count, 1);
        assert_eq!(occupied_bytes, 800);
        assert_eq!(capacity_bytes, 1024);
    }

    monitor.shutdown().await;
}

#[tokio::test]
async fn test_events_serialize_with_type_tag() {
    let (controller, _session) = controller_with(config_with_capacity(4096));
    let mut rx = controller.subscribe_events();
    controller.session_bridge().on_track_started(test_track(5));

    let event = rx.recv().await.unwrap();
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "StateChanged");
    assert_eq!(json["new_state"], "playing");
}
