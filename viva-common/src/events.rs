//! Event types for the Viva playback event system
//!
//! These events leave the playback engine through a broadcast channel and are
//! consumed by the application layer (UI, telemetry, persistence). They are
//! never produced on the real-time render path; the render path only bumps
//! counters that the monitoring task converts into events.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Playback controller state
///
/// ```text
/// Idle --(track-started)--> Playing --(seek requested)--> Seeking
///  ^                          |  ^                          |
///  |                          |  +---(seek acknowledged)----+
///  +--(track-ended / error)---+-----------------------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// No current track; waiting for the next track-started notification
    Idle,
    /// A track is current and frames are expected on the render path
    Playing,
    /// A seek has been issued and not yet acknowledged by the session
    Seeking,
}

impl PlaybackState {
    /// Encode for storage in an `AtomicU8`
    pub const fn as_u8(self) -> u8 {
        match self {
            PlaybackState::Idle => 0,
            PlaybackState::Playing => 1,
            PlaybackState::Seeking => 2,
        }
    }

    /// Decode from an `AtomicU8`; unknown values map to Idle
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => PlaybackState::Playing,
            2 => PlaybackState::Seeking,
            _ => PlaybackState::Idle,
        }
    }

    /// True when the render path should expect audio
    ///
    /// The buffer is closed while Seeking, so an empty render there is
    /// expected and not an underrun.
    pub const fn audio_expected(self) -> bool {
        matches!(self, PlaybackState::Playing)
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "idle"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Seeking => write!(f, "seeking"),
        }
    }
}

/// Viva playback event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlaybackEvent {
    /// Controller state machine transitioned
    StateChanged {
        old_state: PlaybackState,
        new_state: PlaybackState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Session reported a new current track
    TrackStarted {
        track_id: Uuid,
        duration_ms: u64,
        sample_rate: u32,
        channels: u16,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Session reported the end of the current track
    TrackEnded {
        track_id: Uuid,
        position_ms: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Seek accepted by the session; position rebased to the target
    SeekCompleted {
        track_id: Uuid,
        position_ms: u64,
        generation: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Seek refused (out of range or rejected by the session)
    SeekRejected {
        requested_ms: i64,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Terminal session failure; playback stopped
    SessionError {
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Periodic playback position update
    PlaybackPosition {
        track_id: Uuid,
        position_ms: u64,
        duration_ms: u64,
        playing: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Render callback ran dry during active playback
    Underrun {
        underrun_count: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Producer offered more data than the buffer could hold
    Backpressure {
        overflow_count: u64,
        occupied_bytes: usize,
        capacity_bytes: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Render callback intervals drifted from the expected cadence
    CallbackIrregular {
        expected_interval_ms: u64,
        total_irregular_count: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl PlaybackEvent {
    /// Event name used for logging and serialized `type` tag
    pub fn event_type(&self) -> &'static str {
        match self {
            PlaybackEvent::StateChanged { .. } => "StateChanged",
            PlaybackEvent::TrackStarted { .. } => "TrackStarted",
            PlaybackEvent::TrackEnded { .. } => "TrackEnded",
            PlaybackEvent::SeekCompleted { .. } => "SeekCompleted",
            PlaybackEvent::SeekRejected { .. } => "SeekRejected",
            PlaybackEvent::SessionError { .. } => "SessionError",
            PlaybackEvent::PlaybackPosition { .. } => "PlaybackPosition",
            PlaybackEvent::Underrun { .. } => "Underrun",
            PlaybackEvent::Backpressure { .. } => "Backpressure",
            PlaybackEvent::CallbackIrregular { .. } => "CallbackIrregular",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_atomic_encoding() {
        for state in [PlaybackState::Idle, PlaybackState::Playing, PlaybackState::Seeking] {
            assert_eq!(PlaybackState::from_u8(state.as_u8()), state);
        }
        assert_eq!(PlaybackState::from_u8(200), PlaybackState::Idle);
    }

    #[test]
    fn test_audio_expected() {
        assert!(!PlaybackState::Idle.audio_expected());
        assert!(PlaybackState::Playing.audio_expected());
        assert!(!PlaybackState::Seeking.audio_expected());
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = PlaybackEvent::Underrun {
            underrun_count: 3,
            timestamp: chrono::Utc::now(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Underrun");
        assert_eq!(json["underrun_count"], 3);
        assert_eq!(event.event_type(), "Underrun");
    }

    #[test]
    fn test_state_serializes_lowercase() {
        let event = PlaybackEvent::StateChanged {
            old_state: PlaybackState::Idle,
            new_state: PlaybackState::Playing,
            timestamp: chrono::Utc::now(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["old_state"], "idle");
        assert_eq!(json["new_state"], "playing");
    }
}
