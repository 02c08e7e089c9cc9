//! Playback position tracking
//!
//! Position is the number of frames the render path actually played since
//! the last seek or track start, converted to time with the track's sample
//! rate. Silence padding is never counted.
//!
//! ## Epoch tagging
//!
//! Every advance carries the buffer generation the frames were dequeued
//! under. The tracker packs a 16-bit epoch tag and a 48-bit frame count into
//! one `AtomicU64`, so "check epoch, add frames" is a single CAS and a seek
//! is a single store. Frames dequeued before a seek can therefore never be
//! charged against the post-seek count, without the render path taking a lock.
//!
//! 48 bits of frames is roughly 46 years at 192 kHz. The tag wraps after
//! 65,536 resets; an advance would have to be delayed across all of them to
//! be misattributed.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;
use viva_common::timing::{duration_to_frames, frames_to_duration, frames_to_ms};

const FRAME_BITS: u32 = 48;
const FRAME_MASK: u64 = (1 << FRAME_BITS) - 1;
const EPOCH_MASK: u64 = 0xFFFF;

fn pack(generation: u64, frames: u64) -> u64 {
    ((generation & EPOCH_MASK) << FRAME_BITS) | (frames & FRAME_MASK)
}

fn epoch_of(state: u64) -> u64 {
    state >> FRAME_BITS
}

fn frames_of(state: u64) -> u64 {
    state & FRAME_MASK
}

/// Lock-free playback position tracker
#[derive(Debug)]
pub struct PositionTracker {
    /// Packed epoch tag and cumulative frame count
    state: AtomicU64,

    /// Full generation of the current epoch (reporting only)
    generation: AtomicU64,

    /// Sample rate of the current track
    sample_rate: AtomicU32,
}

impl Default for PositionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionTracker {
    pub fn new() -> Self {
        Self {
            state: AtomicU64::new(pack(0, 0)),
            generation: AtomicU64::new(0),
            sample_rate: AtomicU32::new(0),
        }
    }

    /// Set the rate used for frame/time conversion (track start)
    pub fn set_sample_rate(&self, sample_rate: u32) {
        self.sample_rate.store(sample_rate, Ordering::Release);
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Acquire)
    }

    /// Add frames played under `generation`
    ///
    /// Returns false, without changing the count, when `generation` is not
    /// the current epoch. Lock-free; called from the render callback.
    pub fn advance(&self, generation: u64, frames: u64) -> bool {
        let tag = generation & EPOCH_MASK;
        let mut current = self.state.load(Ordering::Acquire);

        loop {
            if epoch_of(current) != tag {
                return false;
            }
            let next = pack(tag, frames_of(current).saturating_add(frames).min(FRAME_MASK));
            match self
                .state
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Start a new epoch at `position`
    pub fn seek_to(&self, generation: u64, position: Duration) {
        let frames = duration_to_frames(position, self.sample_rate()).min(FRAME_MASK);
        self.generation.store(generation, Ordering::Release);
        self.state.store(pack(generation, frames), Ordering::Release);

        debug!(
            "Position rebased: generation={}, frames={}, position={:?}",
            generation, frames, position
        );
    }

    /// Start a new epoch that continues from the current count plus `extra_frames`
    ///
    /// Advances that land before the switch are kept. Returns the new count.
    pub fn carry_over(&self, generation: u64, extra_frames: u64) -> u64 {
        let mut current = self.state.load(Ordering::Acquire);
        let frames = loop {
            let frames = frames_of(current).saturating_add(extra_frames).min(FRAME_MASK);
            match self.state.compare_exchange_weak(
                current,
                pack(generation, frames),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break frames,
                Err(actual) => current = actual,
            }
        };
        self.generation.store(generation, Ordering::Release);

        debug!(
            "Position carried over: generation={}, frames={} (+{})",
            generation, frames, extra_frames
        );
        frames
    }

    /// Start a new epoch at zero (track start)
    pub fn reset(&self, generation: u64) {
        self.generation.store(generation, Ordering::Release);
        self.state.store(pack(generation, 0), Ordering::Release);
    }

    /// Frames played in the current epoch
    pub fn frames(&self) -> u64 {
        frames_of(self.state.load(Ordering::Acquire))
    }

    /// Generation of the current epoch
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn current_position(&self) -> Duration {
        frames_to_duration(self.frames(), self.sample_rate())
    }

    pub fn current_position_ms(&self) -> u64 {
        frames_to_ms(self.frames(), self.sample_rate())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use viva_common::timing::frame_duration;

    fn tracker_at(sample_rate: u32, generation: u64) -> PositionTracker {
        let tracker = PositionTracker::new();
        tracker.set_sample_rate(sample_rate);
        tracker.reset(generation);
        tracker
    }

    #[test]
    fn test_advance_accumulates() {
        let tracker = tracker_at(44_100, 1);

        assert!(tracker.advance(1, 22_050));
        assert!(tracker.advance(1, 22_050));
        assert_eq!(tracker.frames(), 44_100);
        assert_eq!(tracker.current_position(), Duration::from_secs(1));
        assert_eq!(tracker.current_position_ms(), 1_000);
    }

    #[test]
    fn test_stale_advance_ignored() {
        let tracker = tracker_at(48_000, 3);
        tracker.advance(3, 480);

        tracker.seek_to(4, Duration::from_secs(10));
        assert!(!tracker.advance(3, 480));
        assert_eq!(tracker.current_position(), Duration::from_secs(10));
        assert_eq!(tracker.generation(), 4);
    }

    #[test]
    fn test_seek_then_read_within_one_frame() {
        let tracker = tracker_at(44_100, 1);
        tracker.advance(1, 1_000_000);

        let target = Duration::from_millis(73_456) + Duration::from_nanos(123);
        tracker.seek_to(2, target);

        let position = tracker.current_position();
        assert!(position <= target);
        assert!(target - position < frame_duration(44_100));
    }

    #[test]
    fn test_carry_over_keeps_played_frames() {
        let tracker = tracker_at(1_000, 2);
        tracker.advance(2, 300);

        assert_eq!(tracker.carry_over(3, 200), 500);
        assert_eq!(tracker.generation(), 3);
        assert!(!tracker.advance(2, 10));
        assert!(tracker.advance(3, 10));
        assert_eq!(tracker.frames(), 510);
    }

    #[test]
    fn test_epoch_tag_wraps() {
        let tracker = tracker_at(1_000, 0x1_0005);
        assert!(tracker.advance(0x1_0005, 10));
        // Same low 16 bits is treated as the same epoch
        assert!(tracker.advance(0x5, 10));
        assert!(!tracker.advance(0x6, 10));
        assert_eq!(tracker.frames(), 20);
    }

    #[test]
    fn test_concurrent_advance_is_exact() {
        let tracker = Arc::new(tracker_at(44_100, 9));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    for _ in 0..10_000 {
                        tracker.advance(9, 1);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(tracker.frames(), 40_000);
    }
}
