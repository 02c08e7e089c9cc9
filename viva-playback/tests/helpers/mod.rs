//! Shared fixtures for viva-playback integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;
use viva_playback::playback::FrameDelivery;
use viva_playback::{
    AudioFormat, PlaybackConfig, PlaybackController, PlaybackSession, SeekRejection, SessionBridge,
    Track,
};

/// Chunk a session pushes while it is still handling a seek
struct InFlightChunk {
    bridge: SessionBridge,
    data: Vec<u8>,
    generation: Option<u64>,
}

/// Session double that records commands and can refuse seeks
#[derive(Default)]
pub struct MockSession {
    seeks: Mutex<Vec<Duration>>,
    reject_reason: Mutex<Option<String>>,
    stops: AtomicUsize,
    current: Mutex<Option<Track>>,
    in_flight: Mutex<Option<InFlightChunk>>,
    in_flight_results: Mutex<Vec<FrameDelivery>>,
}

impl MockSession {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Refuse every following seek with `reason`
    pub fn reject_seeks(&self, reason: &str) {
        *self.reject_reason.lock().unwrap() = Some(reason.to_string());
    }

    pub fn set_current_track(&self, track: Option<Track>) {
        *self.current.lock().unwrap() = track;
    }

    pub fn seek_calls(&self) -> Vec<Duration> {
        self.seeks.lock().unwrap().clone()
    }

    pub fn stop_calls(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Deliver `data` through `bridge` from inside the next seek
    ///
    /// With `generation: None` the chunk is tagged the way a live producer
    /// does it, with whatever generation the bridge reports at that moment.
    pub fn deliver_during_next_seek(&self, bridge: SessionBridge, data: Vec<u8>, generation: Option<u64>) {
        *self.in_flight.lock().unwrap() = Some(InFlightChunk {
            bridge,
            data,
            generation,
        });
    }

    /// Outcomes of the chunks delivered from inside `seek`
    pub fn in_flight_results(&self) -> Vec<FrameDelivery> {
        self.in_flight_results.lock().unwrap().clone()
    }
}

impl PlaybackSession for MockSession {
    fn seek(&self, position: Duration) -> Result<(), SeekRejection> {
        self.seeks.lock().unwrap().push(position);

        // Taken out so the bridge (and its controller reference) is not kept alive
        if let Some(chunk) = self.in_flight.lock().unwrap().take() {
            let generation = chunk
                .generation
                .unwrap_or_else(|| chunk.bridge.current_generation());
            let delivery = chunk.bridge.on_frame_available(chunk.data, generation);
            self.in_flight_results.lock().unwrap().push(delivery);
        }
        match self.reject_reason.lock().unwrap().as_ref() {
            Some(reason) => Err(SeekRejection::new(reason.clone())),
            None => Ok(()),
        }
    }

    fn current_track(&self) -> Option<Track> {
        self.current.lock().unwrap().clone()
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// CD-format track of the given length
pub fn test_track(secs: u64) -> Track {
    Track::new(Uuid::new_v4(), Duration::from_secs(secs), AudioFormat::CD)
}

/// `frames` CD frames filled with `value`
pub fn pcm(frames: usize, value: u8) -> Vec<u8> {
    vec![value; frames * AudioFormat::CD.bytes_per_frame()]
}

pub fn config_with_capacity(buffer_capacity_bytes: usize) -> PlaybackConfig {
    PlaybackConfig {
        buffer_capacity_bytes,
        ..PlaybackConfig::default()
    }
}

pub fn controller_with(config: PlaybackConfig) -> (PlaybackController, Arc<MockSession>) {
    let session = MockSession::new();
    let controller = PlaybackController::new(session.clone(), config).unwrap();
    (controller, session)
}

/// Controller already Playing `track`
pub fn playing_controller(track: &Track) -> (PlaybackController, Arc<MockSession>) {
    let (controller, session) = controller_with(config_with_capacity(512 * 1024));
    session.set_current_track(Some(track.clone()));
    controller.session_bridge().on_track_started(track.clone());
    (controller, session)
}

/// Enqueue and render `frames` frames so the position moves forward
pub fn play_frames(controller: &PlaybackController, frames: usize) {
    let bridge = controller.session_bridge();
    let render = controller.render_bridge();
    bridge.on_frame_available(pcm(frames, 1), bridge.current_generation());

    let mut out = pcm(frames, 0);
    render.render(&mut out, frames);
}
