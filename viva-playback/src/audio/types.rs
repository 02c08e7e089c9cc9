//! Core audio data types
//!
//! Defines the track metadata, PCM format and chunk structures that cross
//! the session boundary.
//!
//! **Format:**
//! - Samples are signed little-endian integers
//! - Interleaved: [L, R, L, R, ...] for stereo
//! - A frame is one sample for every channel

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// PCM format of a track as delivered by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Frames per second
    pub sample_rate: u32,

    /// Interleaved channel count
    pub channels: u16,

    /// Bits per sample (8, 16, 24 or 32)
    pub bits_per_sample: u16,
}

impl AudioFormat {
    /// CD quality: 44.1 kHz, stereo, 16-bit
    pub const CD: AudioFormat = AudioFormat {
        sample_rate: 44_100,
        channels: 2,
        bits_per_sample: 16,
    };

    pub fn new(sample_rate: u32, channels: u16, bits_per_sample: u16) -> Result<Self> {
        let format = Self {
            sample_rate,
            channels,
            bits_per_sample,
        };
        format.validate()?;
        Ok(format)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(Error::InvalidFormat("sample rate must be non-zero".to_string()));
        }
        if self.channels == 0 {
            return Err(Error::InvalidFormat("channel count must be non-zero".to_string()));
        }
        if !matches!(self.bits_per_sample, 8 | 16 | 24 | 32) {
            return Err(Error::InvalidFormat(format!(
                "unsupported bit depth: {}",
                self.bits_per_sample
            )));
        }
        Ok(())
    }

    /// Bytes occupied by one interleaved frame
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * (self.bits_per_sample as usize / 8)
    }

    /// Bytes needed to hold `duration` of audio in this format
    pub fn bytes_for(&self, duration: Duration) -> usize {
        let frames = viva_common::timing::duration_to_frames(duration, self.sample_rate);
        frames as usize * self.bytes_per_frame()
    }

    /// Pack into a single u64 so the render path can load it without tearing
    ///
    /// Layout: `sample_rate << 32 | channels << 16 | bits_per_sample`
    pub fn to_bits(self) -> u64 {
        ((self.sample_rate as u64) << 32) | ((self.channels as u64) << 16) | self.bits_per_sample as u64
    }

    pub fn from_bits(bits: u64) -> Self {
        Self {
            sample_rate: (bits >> 32) as u32,
            channels: ((bits >> 16) & 0xFFFF) as u16,
            bits_per_sample: (bits & 0xFFFF) as u16,
        }
    }
}

/// Track metadata reported by the session on track start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Opaque session-side identifier
    pub id: Uuid,

    /// Display name, when the session provides one
    pub name: Option<String>,

    /// Total track length
    pub duration: Duration,

    /// Format of the PCM frames delivered for this track
    pub format: AudioFormat,
}

impl Track {
    pub fn new(id: Uuid, duration: Duration, format: AudioFormat) -> Self {
        Self {
            id,
            name: None,
            duration,
            format,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn duration_ms(&self) -> u64 {
        viva_common::timing::duration_to_ms(self.duration)
    }
}

/// Collection a track was started from (playlist, album, search result)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackContext {
    pub id: Uuid,
    pub name: String,
}

impl PlaybackContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
        }
    }
}

/// A contiguous run of decoded PCM bytes tagged with its buffer epoch
///
/// `sequence` increases monotonically within one generation and restarts at
/// zero whenever the generation changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmChunk {
    pub generation: u64,
    pub sequence: u64,
    pub data: Vec<u8>,
}

impl PcmChunk {
    pub fn new(generation: u64, sequence: u64, data: Vec<u8>) -> Self {
        Self {
            generation,
            sequence,
            data,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
