//! Shared playback state
//!
//! State reachable from both callback domains. Everything the render path
//! reads is atomic; the control-only state (current track, context) lives in
//! the controller behind its own lock.

use crate::audio::types::AudioFormat;
use crate::playback::callback_monitor::CallbackMonitor;
use crate::playback::frame_buffer::FrameBuffer;
use crate::playback::position::PositionTracker;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use tokio::sync::broadcast;
use tracing::info;
use viva_common::events::{PlaybackEvent, PlaybackState};

/// Shared state accessible by the controller and both bridges
#[derive(Debug)]
pub struct SharedState {
    /// Decoded PCM awaiting render
    pub buffer: FrameBuffer,

    /// Frames played since the last seek or track start
    pub tracker: PositionTracker,

    /// Render callback counters
    pub monitor: CallbackMonitor,

    /// Controller state, encoded with `PlaybackState::as_u8`
    playback_state: AtomicU8,

    /// Current track format, encoded with `AudioFormat::to_bits`
    format: AtomicU64,

    /// Event broadcaster for the application layer
    event_tx: broadcast::Sender<PlaybackEvent>,
}

impl SharedState {
    pub fn new(buffer_capacity_bytes: usize, event_channel_capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(event_channel_capacity.max(1));
        Self {
            buffer: FrameBuffer::with_capacity(buffer_capacity_bytes),
            tracker: PositionTracker::new(),
            monitor: CallbackMonitor::new(),
            playback_state: AtomicU8::new(PlaybackState::Idle.as_u8()),
            format: AtomicU64::new(0),
            event_tx,
        }
    }

    pub fn playback_state(&self) -> PlaybackState {
        PlaybackState::from_u8(self.playback_state.load(Ordering::Acquire))
    }

    /// Transition and broadcast StateChanged when the state actually changes
    ///
    /// Returns the previous state.
    pub fn set_playback_state(&self, new_state: PlaybackState) -> PlaybackState {
        let old_state =
            PlaybackState::from_u8(self.playback_state.swap(new_state.as_u8(), Ordering::AcqRel));

        if old_state != new_state {
            info!("Playback state: {} -> {}", old_state, new_state);
            self.broadcast_event(PlaybackEvent::StateChanged {
                old_state,
                new_state,
                timestamp: chrono::Utc::now(),
            });
        }
        old_state
    }

    /// Current track format; all-zero while no track has started
    pub fn format(&self) -> AudioFormat {
        AudioFormat::from_bits(self.format.load(Ordering::Acquire))
    }

    pub fn set_format(&self, format: AudioFormat) {
        self.format.store(format.to_bits(), Ordering::Release);
    }

    /// Broadcast an event to all subscribers
    pub fn broadcast_event(&self, event: PlaybackEvent) {
        // No receivers is OK
        let _ = self.event_tx.send(event);
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.event_tx.subscribe()
    }
}
