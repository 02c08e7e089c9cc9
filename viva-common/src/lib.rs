//! # Viva Common Library
//!
//! Shared code for the Viva playback crates including:
//! - Error type shared by configuration loading and format validation
//! - Outward event types (PlaybackEvent enum) and the playback state machine states
//! - Frame/time conversion helpers used by the position tracker
//! - TOML bootstrap configuration loading

pub mod config;
pub mod error;
pub mod events;
pub mod timing;

pub use error::{Error, Result};
pub use events::{PlaybackEvent, PlaybackState};
