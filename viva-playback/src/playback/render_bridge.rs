//! Pull-side adapter invoked by the output hardware
//!
//! `render` is the single entry point of the real-time callback. It never
//! blocks, allocates, logs or panics: it copies what the FrameBuffer holds,
//! pads the rest with silence, charges only the real frames to the position
//! tracker and bumps counters for the monitoring task.

use crate::audio::types::AudioFormat;
use crate::state::SharedState;
use std::sync::Arc;

/// Result of one render callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderOutcome {
    /// Frames copied from the buffer (counted as played)
    pub frames_supplied: usize,

    /// Frames filled with silence
    pub frames_silenced: usize,

    /// The callback ran dry while playback was active
    pub underrun: bool,
}

impl RenderOutcome {
    /// Frames written to the output slice, audio and silence together
    pub fn frames_written(&self) -> usize {
        self.frames_supplied + self.frames_silenced
    }
}

/// Render capability handed to the output unit
#[derive(Debug, Clone)]
pub struct RenderBridge {
    shared: Arc<SharedState>,
}

impl RenderBridge {
    pub(crate) fn new(shared: Arc<SharedState>) -> Self {
        Self { shared }
    }

    /// Format the output must be configured for
    pub fn format(&self) -> AudioFormat {
        self.shared.format()
    }

    /// Hardware buffer size, used to seed callback interval monitoring
    pub fn set_expected_callback_frames(&self, frames_per_callback: u32, sample_rate: u32) {
        self.shared
            .monitor
            .set_expected_interval(frames_per_callback, sample_rate);
    }

    /// Fill `output` with `frame_count` frames
    ///
    /// `output` holds interleaved PCM in the current track format. If it is
    /// shorter than `frame_count` frames only whole frames that fit are
    /// written; any trailing partial frame is zeroed. While no track format
    /// is known the whole slice is silence.
    pub fn render(&self, output: &mut [u8], frame_count: usize) -> RenderOutcome {
        let shared = &self.shared;
        shared.monitor.record_callback();

        let bytes_per_frame = shared.format().bytes_per_frame();
        if bytes_per_frame == 0 {
            output.fill(0);
            return RenderOutcome {
                frames_supplied: 0,
                frames_silenced: frame_count,
                underrun: false,
            };
        }

        let requested_frames = frame_count.min(output.len() / bytes_per_frame);
        let requested_bytes = requested_frames * bytes_per_frame;
        let (audio, tail) = output.split_at_mut(requested_bytes);

        let outcome = shared.buffer.dequeue(audio);
        let frames_supplied = outcome.bytes / bytes_per_frame;

        // Silence for whatever the buffer could not supply
        audio[outcome.bytes..].fill(0);
        tail.fill(0);

        if frames_supplied > 0 {
            shared.tracker.advance(outcome.generation, frames_supplied as u64);
        }

        let underrun = outcome.underrun && shared.playback_state().audio_expected();
        if underrun {
            shared.monitor.record_underrun();
        }

        RenderOutcome {
            frames_supplied,
            frames_silenced: requested_frames - frames_supplied,
            underrun,
        }
    }

    /// `render` for an output opened with a fixed `stream_format`
    ///
    /// When the current track format differs, the callback gets silence and
    /// nothing is dequeued, so a rate or sample-size mismatch is never played.
    pub fn render_as(&self, stream_format: AudioFormat, output: &mut [u8], frame_count: usize) -> RenderOutcome {
        if self.shared.format() != stream_format {
            self.shared.monitor.record_callback();
            output.fill(0);
            return RenderOutcome {
                frames_supplied: 0,
                frames_silenced: frame_count,
                underrun: false,
            };
        }
        self.render(output, frame_count)
    }
}
