//! Push-side adapter invoked by the streaming session
//!
//! Frame deliveries go straight into the FrameBuffer, whose generation
//! check decides whether they still belong to the current epoch. Lifecycle
//! notifications are posted to the controller as `ControlMessage`s and
//! applied under its control lock, so a frame racing a track change is
//! either drained by the reset or rejected as stale.

use crate::audio::types::{PcmChunk, Track};
use crate::playback::controller::{ControlMessage, ControllerInner};
use crate::playback::frame_buffer::EnqueueError;
use crate::session::SessionEvent;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, trace, warn};

/// What happened to one frame-available delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameDelivery {
    /// Chunk enqueued in full
    Accepted { bytes: usize },

    /// Buffer full; the chunk is handed back for a later retry
    Backpressure { data: Vec<u8> },

    /// Chunk dropped (stale generation, buffer closed or misaligned)
    Discarded,
}

/// Per-generation chunk numbering
#[derive(Debug, Default)]
struct SequenceState {
    generation: u64,
    next: u64,
}

/// Session capability set handed out by `PlaybackController::session_bridge`
#[derive(Clone)]
pub struct SessionBridge {
    inner: Arc<ControllerInner>,
    sequence: Arc<Mutex<SequenceState>>,
}

impl std::fmt::Debug for SessionBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBridge")
            .field("generation", &self.current_generation())
            .finish()
    }
}

impl SessionBridge {
    pub(crate) fn new(inner: Arc<ControllerInner>) -> Self {
        Self {
            inner,
            sequence: Arc::new(Mutex::new(SequenceState::default())),
        }
    }

    /// Generation a producer should tag freshly decoded frames with
    pub fn current_generation(&self) -> u64 {
        self.inner.shared.buffer.generation()
    }

    /// Decoded PCM ready
    ///
    /// `data` must hold whole frames of the current track format.
    pub fn on_frame_available(&self, data: Vec<u8>, generation: u64) -> FrameDelivery {
        let bytes_per_frame = self.inner.shared.format().bytes_per_frame();
        if bytes_per_frame == 0 {
            trace!("Frames delivered before any track started, dropped");
            return FrameDelivery::Discarded;
        }
        if data.len() % bytes_per_frame != 0 {
            warn!(
                "Dropping misaligned chunk: {} bytes is not a multiple of {} bytes per frame",
                data.len(),
                bytes_per_frame
            );
            return FrameDelivery::Discarded;
        }

        // Held through the enqueue so sequence order matches buffer order
        let mut sequence = self.sequence.lock().unwrap_or_else(PoisonError::into_inner);
        if sequence.generation != generation {
            sequence.generation = generation;
            sequence.next = 0;
        }

        let chunk = PcmChunk::new(generation, sequence.next, data);
        match self.inner.shared.buffer.enqueue(&chunk) {
            Ok(bytes) => {
                sequence.next += 1;
                FrameDelivery::Accepted { bytes }
            }
            Err(EnqueueError::Overflow { .. }) => FrameDelivery::Backpressure { data: chunk.data },
            Err(e @ EnqueueError::StaleGeneration { .. }) => {
                trace!("Discarding chunk #{}: {}", chunk.sequence, e);
                FrameDelivery::Discarded
            }
            Err(e @ EnqueueError::Closed { .. }) => {
                trace!("Discarding chunk #{}: {}", chunk.sequence, e);
                FrameDelivery::Discarded
            }
        }
    }

    /// New current track
    pub fn on_track_started(&self, track: Track) {
        if let Err(e) = track.format.validate() {
            error!("Track {} has an unusable format: {}", track.id, e);
            self.inner
                .dispatch(ControlMessage::SessionError(format!("track {}: {}", track.id, e)));
            return;
        }

        if let Some(reported) = self.inner.session.current_track() {
            if reported.id != track.id {
                warn!(
                    "Track-started for {} while the session reports {} as current",
                    track.id, reported.id
                );
            }
        }

        self.inner.dispatch(ControlMessage::TrackStarted(track));
    }

    pub fn on_track_ended(&self) {
        self.inner.dispatch(ControlMessage::TrackEnded);
    }

    pub fn on_session_error(&self, reason: impl Into<String>) {
        self.inner.dispatch(ControlMessage::SessionError(reason.into()));
    }

    /// Route one session event; a chunk that hits backpressure is dropped
    pub fn handle(&self, event: SessionEvent) {
        trace!("Session event: {}", event.event_type());
        match event {
            SessionEvent::FrameAvailable { data, generation } => {
                if let FrameDelivery::Backpressure { data } = self.on_frame_available(data, generation) {
                    debug!("Backpressure: dropped {} byte chunk", data.len());
                }
            }
            SessionEvent::TrackStarted(track) => self.on_track_started(track),
            SessionEvent::TrackEnded => self.on_track_ended(),
            SessionEvent::Error(reason) => self.on_session_error(reason),
        }
    }

    /// Producer loop: drain `rx` until every sender is gone
    ///
    /// Chunks that hit backpressure are retried after
    /// `backpressure_retry_ms` until they fit, turn stale or the buffer
    /// closes. Blocks the calling thread; run it on the producer side.
    pub fn pump(&self, rx: Receiver<SessionEvent>) {
        let retry = self.inner.config.backpressure_retry();
        debug!("Session pump started");

        for event in rx {
            let SessionEvent::FrameAvailable { mut data, generation } = event else {
                self.handle(event);
                continue;
            };

            loop {
                match self.on_frame_available(data, generation) {
                    FrameDelivery::Backpressure { data: rejected } => {
                        data = rejected;
                        std::thread::sleep(retry);
                    }
                    FrameDelivery::Accepted { .. } | FrameDelivery::Discarded => break,
                }
            }
        }

        debug!("Session pump finished: channel closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::types::AudioFormat;
    use crate::config::PlaybackConfig;
    use crate::playback::controller::PlaybackController;
    use crate::session::{PlaybackSession, SeekRejection};
    use std::time::Duration;
    use uuid::Uuid;

    struct NullSession;

    impl PlaybackSession for NullSession {
        fn seek(&self, _position: Duration) -> Result<(), SeekRejection> {
            Ok(())
        }

        fn current_track(&self) -> Option<Track> {
            None
        }

        fn stop(&self) {}
    }

    fn bridge_with_track(capacity: usize) -> (PlaybackController, SessionBridge) {
        let config = PlaybackConfig {
            buffer_capacity_bytes: capacity,
            ..PlaybackConfig::default()
        };
        let controller = PlaybackController::new(Arc::new(NullSession), config).unwrap();
        let bridge = controller.session_bridge();
        bridge.on_track_started(Track::new(Uuid::new_v4(), Duration::from_secs(60), AudioFormat::CD));
        (controller, bridge)
    }

    #[test]
    fn test_frames_before_track_dropped() {
        let controller = PlaybackController::new(Arc::new(NullSession), PlaybackConfig::default()).unwrap();
        let bridge = controller.session_bridge();

        assert_eq!(bridge.on_frame_available(vec![0; 16], 0), FrameDelivery::Discarded);
    }

    #[test]
    fn test_misaligned_chunk_dropped() {
        let (controller, bridge) = bridge_with_track(4096);
        let generation = bridge.current_generation();

        assert_eq!(bridge.on_frame_available(vec![0; 6], generation), FrameDelivery::Discarded);
        assert_eq!(controller.buffer_stats().occupied, 0);
    }

    #[test]
    fn test_sequence_restarts_per_generation() {
        let (controller, bridge) = bridge_with_track(4096);
        let generation = bridge.current_generation();

        bridge.on_frame_available(vec![0; 8], generation);
        bridge.on_frame_available(vec![0; 8], generation);
        assert_eq!(controller.buffer_stats().last_sequence, 1);

        controller.seek_to_position(Duration::from_secs(5)).unwrap();
        let generation = bridge.current_generation();
        bridge.on_frame_available(vec![0; 8], generation);
        assert_eq!(controller.buffer_stats().last_sequence, 0);
    }

    #[test]
    fn test_backpressure_returns_chunk() {
        let (_controller, bridge) = bridge_with_track(16);
        let generation = bridge.current_generation();

        assert_eq!(
            bridge.on_frame_available(vec![1; 12], generation),
            FrameDelivery::Accepted { bytes: 12 }
        );
        assert_eq!(
            bridge.on_frame_available(vec![2; 8], generation),
            FrameDelivery::Backpressure { data: vec![2; 8] }
        );
    }

    #[test]
    fn test_invalid_track_format_is_session_error() {
        let (controller, bridge) = bridge_with_track(4096);
        let bad = AudioFormat {
            sample_rate: 0,
            channels: 2,
            bits_per_sample: 16,
        };
        bridge.on_track_started(Track::new(Uuid::new_v4(), Duration::from_secs(1), bad));

        assert_eq!(controller.state(), viva_common::PlaybackState::Idle);
        assert!(controller.current_track().is_none());
    }
}
