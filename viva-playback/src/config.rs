//! Configuration for the playback bridge
//!
//! Bootstrap settings loaded from TOML with built-in defaults for every field.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line argument (--config)
//! 2. Environment variable (VIVA_CONFIG)
//! 3. Per-user `playback.toml`
//! 4. Built-in defaults (code constants)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::info;
use viva_common::config::{load_or_default, CONFIG_ENV_VAR};

/// File name looked up in the per-user config directory
pub const CONFIG_FILE_NAME: &str = "playback.toml";

/// Playback bridge configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PlaybackConfig {
    /// FrameBuffer capacity in bytes
    ///
    /// Default: 352,800 bytes (2 s of 44.1 kHz stereo 16-bit PCM)
    #[serde(default = "default_buffer_capacity_bytes")]
    pub buffer_capacity_bytes: usize,

    /// Polling interval of the monitoring task
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,

    /// Interval between PlaybackPosition events while playing
    #[serde(default = "default_position_event_interval_ms")]
    pub position_event_interval_ms: u64,

    /// Underruns within this window after a track starts are logged at trace level
    #[serde(default = "default_underrun_grace_period_ms")]
    pub underrun_grace_period_ms: u64,

    /// Capacity of the outward PlaybackEvent broadcast channel
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Producer sleep between retries when the buffer pushes back
    #[serde(default = "default_backpressure_retry_ms")]
    pub backpressure_retry_ms: u64,
}

fn default_buffer_capacity_bytes() -> usize {
    352_800
}

fn default_monitor_interval_ms() -> u64 {
    100
}

fn default_position_event_interval_ms() -> u64 {
    1_000
}

fn default_underrun_grace_period_ms() -> u64 {
    2_000
}

fn default_event_channel_capacity() -> usize {
    100
}

fn default_backpressure_retry_ms() -> u64 {
    5
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            buffer_capacity_bytes: default_buffer_capacity_bytes(),
            monitor_interval_ms: default_monitor_interval_ms(),
            position_event_interval_ms: default_position_event_interval_ms(),
            underrun_grace_period_ms: default_underrun_grace_period_ms(),
            event_channel_capacity: default_event_channel_capacity(),
            backpressure_retry_ms: default_backpressure_retry_ms(),
        }
    }
}

impl PlaybackConfig {
    /// Resolve, load and validate configuration
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let config: PlaybackConfig = load_or_default(cli_path, CONFIG_ENV_VAR, CONFIG_FILE_NAME)?;
        config.validate()?;

        info!(
            "Playback config: buffer={} bytes, monitor={}ms, position events={}ms",
            config.buffer_capacity_bytes, config.monitor_interval_ms, config.position_event_interval_ms
        );
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity_bytes == 0 {
            return Err(Error::Config("buffer_capacity_bytes must be greater than zero".to_string()));
        }
        if self.monitor_interval_ms == 0 {
            return Err(Error::Config("monitor_interval_ms must be greater than zero".to_string()));
        }
        if self.event_channel_capacity == 0 {
            return Err(Error::Config("event_channel_capacity must be greater than zero".to_string()));
        }
        Ok(())
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    pub fn position_event_interval(&self) -> Duration {
        Duration::from_millis(self.position_event_interval_ms)
    }

    pub fn underrun_grace_period(&self) -> Duration {
        Duration::from_millis(self.underrun_grace_period_ms)
    }

    pub fn backpressure_retry(&self) -> Duration {
        Duration::from_millis(self.backpressure_retry_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PlaybackConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.buffer_capacity_bytes, 352_800);
        assert_eq!(config.monitor_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: PlaybackConfig = toml::from_str("buffer_capacity_bytes = 4096").unwrap();
        assert_eq!(config.buffer_capacity_bytes, 4096);
        assert_eq!(config.position_event_interval_ms, 1_000);
        assert_eq!(config.event_channel_capacity, 100);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = PlaybackConfig {
            buffer_capacity_bytes: 0,
            ..PlaybackConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
