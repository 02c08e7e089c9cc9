//! Audio types and the optional device output

#[cfg(feature = "cpal-output")]
pub mod output;
pub mod types;

#[cfg(feature = "cpal-output")]
pub use output::CpalOutput;
pub use types::{AudioFormat, PcmChunk, PlaybackContext, Track};
