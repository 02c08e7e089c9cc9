//! # Viva Playback Library (viva-playback)
//!
//! Buffering and synchronization layer between a push-style streaming
//! session and a pull-style real-time render callback.
//!
//! **Architecture:** SessionBridge → FrameBuffer → RenderBridge → PositionTracker,
//! orchestrated by a PlaybackController that serializes seek, track change and stop.

pub mod audio;
pub mod config;
pub mod error;
pub mod playback;
pub mod session;
pub mod state;

pub use audio::{AudioFormat, PcmChunk, PlaybackContext, Track};
pub use config::PlaybackConfig;
pub use error::{Error, Result};
pub use playback::{FrameBuffer, PlaybackController, PositionTracker, RenderBridge, SessionBridge};
pub use session::{PlaybackSession, SeekRejection, SessionEvent};
