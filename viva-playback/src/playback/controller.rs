//! Playback controller - state machine and control orchestration
//!
//! **Responsibilities:**
//! - Owns the current track reference and playback context
//! - Serializes seek, track change and stop against each other
//! - Applies session lifecycle notifications posted by the SessionBridge
//! - Hands out the two callback capability sets (render and session side)
//!
//! Control operations run under one mutex. The render path never takes it:
//! it only sees the atomics in `SharedState`.
//!
//! ## Seek sequence
//!
//! ```text
//! validate target (Playing, 0 <= t < duration)
//!   -> state Seeking
//!   -> generation bump + drain, buffer closed (FrameBuffer::drain_and_close)
//!   -> session.seek(t)
//!        ok  -> generation bump, buffer opened, position rebased to t,
//!               state Playing, SeekCompleted
//!        err -> buffer reopened under the window generation, position
//!               carried forward by the drained frames, state Playing
//! ```
//!
//! Every frame-available between the first bump and the end of the seek is
//! discarded, whatever generation it carries.

use crate::audio::types::{PlaybackContext, Track};
use crate::config::PlaybackConfig;
use crate::error::{Error, Result};
use crate::playback::callback_monitor::CallbackStats;
use crate::playback::frame_buffer::BufferStats;
use crate::playback::monitor::{spawn_monitoring_task, MonitorHandle};
use crate::playback::render_bridge::RenderBridge;
use crate::playback::session_bridge::SessionBridge;
use crate::session::PlaybackSession;
use crate::state::SharedState;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use viva_common::events::{PlaybackEvent, PlaybackState};
use viva_common::timing::duration_to_ms;

/// Lifecycle notification posted by the session side
#[derive(Debug, Clone)]
pub(crate) enum ControlMessage {
    TrackStarted(Track),
    TrackEnded,
    SessionError(String),
}

/// State only the control context touches
#[derive(Debug, Default)]
struct ControlState {
    track: Option<Track>,
    context: Option<PlaybackContext>,
}

pub(crate) struct ControllerInner {
    pub(crate) shared: Arc<SharedState>,
    pub(crate) session: Arc<dyn PlaybackSession>,
    pub(crate) config: PlaybackConfig,
    control: Mutex<ControlState>,
}

/// Single active playback instance
///
/// Created when a playback session starts and dropped when it ends. Cheap to
/// clone; clones share the same engine.
#[derive(Clone)]
pub struct PlaybackController {
    inner: Arc<ControllerInner>,
}

impl std::fmt::Debug for PlaybackController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackController")
            .field("state", &self.inner.shared.playback_state())
            .field("buffer", &self.inner.shared.buffer)
            .finish()
    }
}

impl PlaybackController {
    pub fn new(session: Arc<dyn PlaybackSession>, config: PlaybackConfig) -> Result<Self> {
        config.validate()?;

        let shared = Arc::new(SharedState::new(
            config.buffer_capacity_bytes,
            config.event_channel_capacity,
        ));

        info!(
            "Playback controller created: buffer={} bytes",
            config.buffer_capacity_bytes
        );

        Ok(Self {
            inner: Arc::new(ControllerInner {
                shared,
                session,
                config,
                control: Mutex::new(ControlState::default()),
            }),
        })
    }

    /// Capability set for the output hardware callback
    pub fn render_bridge(&self) -> RenderBridge {
        RenderBridge::new(Arc::clone(&self.inner.shared))
    }

    /// Capability set for the streaming session
    pub fn session_bridge(&self) -> SessionBridge {
        SessionBridge::new(Arc::clone(&self.inner))
    }

    /// Seek within the current track
    ///
    /// Fails with `InvalidState` outside Playing, `InvalidPosition` when the
    /// target is not in `[0, duration)` and `SeekRejected` when the session
    /// refuses it. Validation failures leave position untouched; after a
    /// session refusal it keeps following the un-sought stream.
    pub fn seek_to_position(&self, position: Duration) -> Result<()> {
        self.inner.seek(position)
    }

    /// Seek to a position given in (possibly negative or non-finite) seconds
    pub fn seek_to_secs(&self, secs: f64) -> Result<()> {
        match Duration::try_from_secs_f64(secs) {
            Ok(position) => self.inner.seek(position),
            Err(_) => {
                let reason = format!("{} s is not a valid track position", secs);
                self.inner.reject_seek(secs_to_ms(secs), &reason);
                Err(Error::InvalidPosition(reason))
            }
        }
    }

    /// Played time within the current track; zero while Idle
    pub fn current_track_position(&self) -> Duration {
        if self.state() == PlaybackState::Idle {
            return Duration::ZERO;
        }
        self.inner.shared.tracker.current_position()
    }

    /// Setter form of `seek_to_secs`
    pub fn set_current_track_position(&self, secs: f64) -> Result<()> {
        self.seek_to_secs(secs)
    }

    pub fn current_track(&self) -> Option<Track> {
        self.inner.lock_control().track.clone()
    }

    pub fn state(&self) -> PlaybackState {
        self.inner.shared.playback_state()
    }

    pub fn playback_context(&self) -> Option<PlaybackContext> {
        self.inner.lock_control().context.clone()
    }

    /// Record the collection upcoming tracks are played from
    pub fn begin_context(&self, context: PlaybackContext) {
        info!("Playback context: {} ({})", context.name, context.id);
        self.inner.lock_control().context = Some(context);
    }

    /// Explicit stop: session stops delivering, buffer is drained and closed
    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.inner.shared.subscribe_events()
    }

    pub fn buffer_stats(&self) -> BufferStats {
        self.inner.shared.buffer.stats()
    }

    pub fn callback_stats(&self) -> CallbackStats {
        self.inner.shared.monitor.stats()
    }

    /// Spawn the background monitoring task on `handle`
    pub fn start_monitoring(&self, handle: &tokio::runtime::Handle) -> MonitorHandle {
        spawn_monitoring_task(self.clone(), handle)
    }

    pub(crate) fn shared(&self) -> &SharedState {
        &self.inner.shared
    }

    pub(crate) fn config(&self) -> &PlaybackConfig {
        &self.inner.config
    }
}

impl ControllerInner {
    fn lock_control(&self) -> MutexGuard<'_, ControlState> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a session lifecycle notification
    pub(crate) fn dispatch(&self, message: ControlMessage) {
        let mut control = self.lock_control();
        match message {
            ControlMessage::TrackStarted(track) => self.handle_track_started(&mut control, track),
            ControlMessage::TrackEnded => self.handle_track_ended(&mut control),
            ControlMessage::SessionError(reason) => self.handle_session_error(&mut control, reason),
        }
    }

    fn handle_track_started(&self, control: &mut ControlState, track: Track) {
        let shared = &self.shared;

        // Closed while the format changes so no chunk is read with the wrong frame size
        let generation = shared.buffer.reset_and_close();
        shared.set_format(track.format);
        shared.tracker.set_sample_rate(track.format.sample_rate);
        shared.tracker.reset(generation);
        shared.buffer.open();
        shared.monitor.mark_track_started();

        if let Some(previous) = control.track.replace(track.clone()) {
            debug!("Track {} replaced by {} without track-ended", previous.id, track.id);
        }

        info!(
            "Track started: {} ({} ms, {} Hz, {} ch), generation={}",
            track.id,
            track.duration_ms(),
            track.format.sample_rate,
            track.format.channels,
            generation
        );

        shared.set_playback_state(PlaybackState::Playing);
        shared.broadcast_event(PlaybackEvent::TrackStarted {
            track_id: track.id,
            duration_ms: track.duration_ms(),
            sample_rate: track.format.sample_rate,
            channels: track.format.channels,
            timestamp: chrono::Utc::now(),
        });
    }

    fn handle_track_ended(&self, control: &mut ControlState) {
        let shared = &self.shared;
        let position_ms = shared.tracker.current_position_ms();
        let generation = shared.buffer.reset_and_close();

        let Some(track) = control.track.take() else {
            debug!("Track-ended without a current track (generation={})", generation);
            shared.set_playback_state(PlaybackState::Idle);
            return;
        };

        info!("Track ended: {} at {} ms", track.id, position_ms);

        shared.set_playback_state(PlaybackState::Idle);
        shared.broadcast_event(PlaybackEvent::TrackEnded {
            track_id: track.id,
            position_ms,
            timestamp: chrono::Utc::now(),
        });
    }

    fn handle_session_error(&self, control: &mut ControlState, reason: String) {
        let shared = &self.shared;
        shared.buffer.reset_and_close();
        control.track = None;
        control.context = None;

        error!("Session error, playback stopped: {}", reason);

        shared.set_playback_state(PlaybackState::Idle);
        shared.broadcast_event(PlaybackEvent::SessionError {
            reason,
            timestamp: chrono::Utc::now(),
        });
    }

    /// Seek sequence; the session must not post lifecycle notifications
    /// synchronously from inside `PlaybackSession::seek`
    fn seek(&self, position: Duration) -> Result<()> {
        let control = self.lock_control();
        let shared = &self.shared;
        let requested_ms = duration_to_ms(position) as i64;

        let state = shared.playback_state();
        if state != PlaybackState::Playing {
            let reason = format!("cannot seek while {}", state);
            self.reject_seek(requested_ms, &reason);
            return Err(Error::InvalidState(reason));
        }

        let Some(track) = control.track.as_ref() else {
            let reason = "no current track".to_string();
            self.reject_seek(requested_ms, &reason);
            return Err(Error::InvalidState(reason));
        };

        if position >= track.duration {
            let reason = format!(
                "{} ms is outside track {} (duration {} ms)",
                requested_ms,
                track.id,
                track.duration_ms()
            );
            self.reject_seek(requested_ms, &reason);
            return Err(Error::InvalidPosition(reason));
        }

        shared.set_playback_state(PlaybackState::Seeking);

        // Closed for the whole window: nothing decoded before the session
        // repositions can be queued as target audio
        let (window_generation, drained) = shared.buffer.drain_and_close();

        debug!(
            "Seeking track {} from {:?} to {:?} (generation={}, drained={} bytes)",
            track.id,
            shared.tracker.current_position(),
            position,
            window_generation,
            drained
        );

        match self.session.seek(position) {
            Ok(()) => {
                let generation = shared.buffer.reset_and_open();
                shared.tracker.seek_to(generation, position);
                shared.set_playback_state(PlaybackState::Playing);

                info!("Seek completed: {} ms (generation={})", requested_ms, generation);
                shared.broadcast_event(PlaybackEvent::SeekCompleted {
                    track_id: track.id,
                    position_ms: requested_ms as u64,
                    generation,
                    timestamp: chrono::Utc::now(),
                });
                Ok(())
            }
            Err(rejection) => {
                // The session cursor never moved: the drained audio counts as
                // played so position stays aligned with what it delivers next
                let bytes_per_frame = shared.format().bytes_per_frame().max(1);
                let skipped_frames = (drained / bytes_per_frame) as u64;
                let generation = shared.buffer.open();
                shared.tracker.carry_over(generation, skipped_frames);
                shared.set_playback_state(PlaybackState::Playing);

                debug!(
                    "Seek abandoned, resuming at generation {} (+{} drained frames)",
                    generation, skipped_frames
                );
                self.reject_seek(requested_ms, &rejection.reason);
                Err(Error::SeekRejected(rejection.reason))
            }
        }
    }

    fn reject_seek(&self, requested_ms: i64, reason: &str) {
        warn!("Seek to {} ms rejected: {}", requested_ms, reason);
        self.shared.broadcast_event(PlaybackEvent::SeekRejected {
            requested_ms,
            reason: reason.to_string(),
            timestamp: chrono::Utc::now(),
        });
    }

    fn stop(&self) {
        let mut control = self.lock_control();
        let shared = &self.shared;

        if shared.playback_state() == PlaybackState::Idle && control.track.is_none() {
            debug!("Stop requested while idle");
        }

        self.session.stop();
        let generation = shared.buffer.reset_and_close();
        control.track = None;
        control.context = None;

        info!("Playback stopped (generation={})", generation);
        shared.set_playback_state(PlaybackState::Idle);
    }
}

fn secs_to_ms(secs: f64) -> i64 {
    if secs.is_finite() {
        (secs * 1000.0) as i64
    } else {
        0
    }
}
