//! Audio output using cpal
//!
//! Drives `RenderBridge::render_as` from the device callback. Only 16-bit
//! tracks are supported: the stream is opened as i16 with the track's rate
//! and channel count, so the buffered bytes map straight onto samples. A
//! later track in another format plays as silence until the output is
//! restarted for it.

use crate::audio::types::AudioFormat;
use crate::error::{Error, Result};
use crate::playback::render_bridge::RenderBridge;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Largest callback, in frames, served without truncation
const MAX_CALLBACK_FRAMES: usize = 8192;

/// Output stream fed by a RenderBridge
pub struct CpalOutput {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    /// Set by the stream error callback
    error_flag: Arc<AtomicBool>,
    error_count: Arc<AtomicU32>,
}

impl CpalOutput {
    /// List available audio output devices
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();

        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Open the default device for `format` and start rendering
    ///
    /// `buffer_frames` requests a fixed hardware buffer; `None` keeps the
    /// device default.
    pub fn start(render_bridge: RenderBridge, format: AudioFormat, buffer_frames: Option<u32>) -> Result<Self> {
        format.validate()?;
        if format.bits_per_sample != 16 {
            return Err(Error::AudioOutput(format!(
                "{}-bit output is not supported, only 16-bit",
                format.bits_per_sample
            )));
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?;
        info!(
            "Using default audio device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let config = StreamConfig {
            channels: format.channels,
            sample_rate: SampleRate(format.sample_rate),
            buffer_size: match buffer_frames {
                Some(size) => cpal::BufferSize::Fixed(size),
                None => cpal::BufferSize::Default,
            },
        };

        if let Some(size) = buffer_frames {
            render_bridge.set_expected_callback_frames(size, format.sample_rate);
        }

        let mut output = Self {
            device,
            config,
            stream: None,
            error_flag: Arc::new(AtomicBool::new(false)),
            error_count: Arc::new(AtomicU32::new(0)),
        };

        let stream = output.build_stream_i16(render_bridge, format)?;
        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;
        output.stream = Some(stream);

        info!(
            "Audio stream started: {} Hz, {} ch, buffer={:?}",
            output.config.sample_rate.0, output.config.channels, output.config.buffer_size
        );
        Ok(output)
    }

    fn build_stream_i16(&self, render_bridge: RenderBridge, format: AudioFormat) -> Result<Stream> {
        let channels = format.channels as usize;
        let bytes_per_frame = format.bytes_per_frame();
        let error_flag = Arc::clone(&self.error_flag);
        let error_count = Arc::clone(&self.error_count);

        // Allocated once here, never inside the callback
        let mut scratch = vec![0u8; MAX_CALLBACK_FRAMES * bytes_per_frame];

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    let frames = (data.len() / channels).min(MAX_CALLBACK_FRAMES);
                    let bytes = &mut scratch[..frames * bytes_per_frame];
                    render_bridge.render_as(format, bytes, frames);

                    for (sample, le) in data.iter_mut().zip(bytes.chunks_exact(2)) {
                        *sample = i16::from_le_bytes([le[0], le[1]]);
                    }
                    // Callback larger than the scratch buffer
                    for sample in data.iter_mut().skip(frames * channels) {
                        *sample = 0;
                    }
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                    error_flag.store(true, Ordering::SeqCst);
                    error_count.fetch_add(1, Ordering::SeqCst);
                },
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))?;

        Ok(stream)
    }

    /// Pause and drop the stream
    pub fn stop(&mut self) -> Result<()> {
        info!("Stopping audio stream");

        if let Some(stream) = self.stream.take() {
            stream
                .pause()
                .map_err(|e| Error::AudioOutput(format!("Failed to pause stream: {}", e)))?;
        }
        Ok(())
    }

    pub fn has_error(&self) -> bool {
        self.error_flag.load(Ordering::SeqCst)
    }

    pub fn error_count(&self) -> u32 {
        self.error_count.load(Ordering::SeqCst)
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            debug!("Error stopping stream on drop: {}", e);
        }
    }
}
