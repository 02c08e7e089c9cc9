//! Frame-based timing conversions for playback position tracking
//!
//! Playback position is counted in **frames** (one sample per channel) and
//! converted to wall-clock time using the current track's sample rate.
//!
//! # Representations
//!
//! 1. **Frames (Internal)**: u64 counts consumed by the render path
//! 2. **Duration (API)**: `std::time::Duration` for controller accessors
//! 3. **Milliseconds (Events)**: u64 values carried by `PlaybackEvent`
//!
//! # Precision
//!
//! - Frame → Duration conversions are exact to the nanosecond (u128 math)
//! - Duration → Frame conversions truncate, so a roundtrip loses less than
//!   one frame of time (≈ 22.7 µs at 44.1 kHz)
//! - A zero sample rate never panics; conversions return zero
//!
//! # Examples
//!
//! ```rust
//! use std::time::Duration;
//! use viva_common::timing::*;
//!
//! let frames = duration_to_frames(Duration::from_secs(30), 44_100);
//! assert_eq!(frames, 1_323_000);
//!
//! let position = frames_to_duration(frames, 44_100);
//! assert_eq!(position, Duration::from_secs(30));
//! ```

use std::time::Duration;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Convert a frame count to elapsed time at `sample_rate`
///
/// ```rust
/// use std::time::Duration;
/// use viva_common::timing::frames_to_duration;
///
/// assert_eq!(frames_to_duration(48_000, 48_000), Duration::from_secs(1));
/// assert_eq!(frames_to_duration(22_050, 44_100), Duration::from_millis(500));
/// assert_eq!(frames_to_duration(1_000, 0), Duration::ZERO);
/// ```
pub fn frames_to_duration(frames: u64, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    let nanos = frames as u128 * NANOS_PER_SEC / sample_rate as u128;
    Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
}

/// Convert elapsed time to a frame count at `sample_rate` (truncating)
///
/// ```rust
/// use std::time::Duration;
/// use viva_common::timing::duration_to_frames;
///
/// assert_eq!(duration_to_frames(Duration::from_secs(2), 44_100), 88_200);
/// // 10 µs is less than one frame at 44.1 kHz
/// assert_eq!(duration_to_frames(Duration::from_micros(10), 44_100), 0);
/// ```
pub fn duration_to_frames(duration: Duration, sample_rate: u32) -> u64 {
    let frames = duration.as_nanos() * sample_rate as u128 / NANOS_PER_SEC;
    frames.min(u64::MAX as u128) as u64
}

/// Convert a frame count to whole milliseconds (truncating)
///
/// ```rust
/// use viva_common::timing::frames_to_ms;
///
/// assert_eq!(frames_to_ms(44_100, 44_100), 1_000);
/// assert_eq!(frames_to_ms(44, 44_100), 0);
/// ```
pub fn frames_to_ms(frames: u64, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    frames.saturating_mul(1_000) / sample_rate as u64
}

/// Convert milliseconds to a frame count (truncating)
pub fn ms_to_frames(milliseconds: u64, sample_rate: u32) -> u64 {
    milliseconds.saturating_mul(sample_rate as u64) / 1_000
}

/// Time resolution of a single frame at `sample_rate`
///
/// Used as the tolerance when comparing a seek target with the tracked
/// position after the target was quantized to a frame boundary.
pub fn frame_duration(sample_rate: u32) -> Duration {
    frames_to_duration(1, sample_rate).max(Duration::from_nanos(1))
}

/// Convert a duration to milliseconds, saturating at `u64::MAX`
pub fn duration_to_ms(duration: Duration) -> u64 {
    duration.as_millis().min(u64::MAX as u128) as u64
}
