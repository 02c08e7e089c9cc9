//! Boundary with the streaming session
//!
//! The session decodes audio on its own schedule and pushes PCM plus
//! lifecycle notifications through `SessionEvent`. The controller calls back
//! into it only for seek, current-track and stop.

use crate::audio::types::Track;
use std::time::Duration;
use thiserror::Error;

/// Session refused a seek target (unseekable stream, position not loaded)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct SeekRejection {
    pub reason: String,
}

impl SeekRejection {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Commands the controller issues to the session
///
/// Implementations are called from the control context, never from the
/// render callback.
pub trait PlaybackSession: Send + Sync {
    /// Reposition decoding so the next delivered frame starts at `position`
    fn seek(&self, position: Duration) -> Result<(), SeekRejection>;

    /// Track the session currently considers active
    fn current_track(&self) -> Option<Track>;

    /// Stop delivering frames
    fn stop(&self);
}

/// Notifications pushed by the session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Decoded PCM ready, tagged with the generation it was produced for
    FrameAvailable { data: Vec<u8>, generation: u64 },

    /// New current track; frames for it follow
    TrackStarted(Track),

    /// Current track played to completion
    TrackEnded,

    /// Terminal session failure
    Error(String),
}

impl SessionEvent {
    /// Event type as string (for logging)
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::FrameAvailable { .. } => "FrameAvailable",
            SessionEvent::TrackStarted(_) => "TrackStarted",
            SessionEvent::TrackEnded => "TrackEnded",
            SessionEvent::Error(_) => "Error",
        }
    }
}
