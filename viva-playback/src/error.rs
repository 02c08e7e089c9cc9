//! Error types for viva-playback
//!
//! Defines module-specific error types using thiserror for clear error propagation.
//! Nothing on the render path returns these: the real-time callback reports
//! through plain values (`RenderOutcome`) and atomic counters instead.

use thiserror::Error;

/// Main error type for viva-playback
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation not valid in the current playback state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Seek target outside [0, track duration)
    #[error("Invalid position: {0}")]
    InvalidPosition(String),

    /// Session refused to honor a seek target
    #[error("Seek rejected: {0}")]
    SeekRejected(String),

    /// Unsupported or inconsistent PCM format
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Errors bubbled up from viva-common
    #[error(transparent)]
    Common(#[from] viva_common::Error),
}

/// Convenience Result type using viva-playback Error
pub type Result<T> = std::result::Result<T, Error>;
