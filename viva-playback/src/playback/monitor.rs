//! Background monitoring task for playback
//!
//! The render path only bumps counters. This task polls them at
//! `monitor_interval_ms`, finalizes callback calibration, logs what changed
//! and turns it into `PlaybackEvent`s for the application layer.

use crate::playback::controller::PlaybackController;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, trace, warn};
use viva_common::events::{PlaybackEvent, PlaybackState};

/// Minimum spacing between irregular-interval events
const IRREGULAR_EVENT_INTERVAL: Duration = Duration::from_secs(5);

/// Minimum spacing between backpressure warnings and events
const BACKPRESSURE_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Handle to a running monitoring task
///
/// Dropping the handle without `shutdown` aborts the task.
#[derive(Debug)]
pub struct MonitorHandle {
    shutdown: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Ask the task to exit and wait for it
    pub async fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                debug!("Monitoring task ended abnormally: {}", e);
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

pub(crate) fn spawn_monitoring_task(
    controller: PlaybackController,
    handle: &tokio::runtime::Handle,
) -> MonitorHandle {
    let shutdown = Arc::new(AtomicBool::new(false));
    let task = handle.spawn(monitoring_loop(controller, Arc::clone(&shutdown)));
    MonitorHandle {
        shutdown,
        task: Some(task),
    }
}

async fn monitoring_loop(controller: PlaybackController, shutdown: Arc<AtomicBool>) {
    let config = controller.config().clone();
    let shared = controller.shared();

    let mut ticker = time::interval(config.monitor_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut last_underrun_count = 0u64;
    let mut last_irregular_count = 0u64;
    let mut last_overflow_count = 0u64;
    let mut last_irregular_event: Option<Instant> = None;
    let mut last_backpressure_log: Option<Instant> = None;
    let mut last_position_event = Instant::now();

    info!(
        "Playback monitoring task started ({}ms interval)",
        config.monitor_interval_ms
    );

    while !shutdown.load(Ordering::Relaxed) {
        ticker.tick().await;

        let callback_stats = shared.monitor.stats();
        if !callback_stats.calibration_complete {
            shared.monitor.check_calibration();
        }

        if callback_stats.underrun_count > last_underrun_count {
            let new_underruns = callback_stats.underrun_count - last_underrun_count;

            if shared.monitor.in_startup_grace(config.underrun_grace_period()) {
                trace!(
                    "Render underrun during track startup: {} total (+{})",
                    callback_stats.underrun_count,
                    new_underruns
                );
            } else {
                warn!(
                    "Render underrun detected: {} total (+{} since last check)",
                    callback_stats.underrun_count, new_underruns
                );
                shared.broadcast_event(PlaybackEvent::Underrun {
                    underrun_count: callback_stats.underrun_count,
                    timestamp: chrono::Utc::now(),
                });
            }
            last_underrun_count = callback_stats.underrun_count;
        }

        if callback_stats.irregular_intervals > last_irregular_count
            && last_irregular_event.map_or(true, |at| at.elapsed() >= IRREGULAR_EVENT_INTERVAL)
        {
            debug!(
                "Irregular render intervals: {} total of {} callbacks (expected {}ms)",
                callback_stats.irregular_intervals,
                callback_stats.callback_count,
                callback_stats.expected_interval_ms
            );
            shared.broadcast_event(PlaybackEvent::CallbackIrregular {
                expected_interval_ms: callback_stats.expected_interval_ms,
                total_irregular_count: callback_stats.irregular_intervals,
                timestamp: chrono::Utc::now(),
            });
            last_irregular_count = callback_stats.irregular_intervals;
            last_irregular_event = Some(Instant::now());
        }

        let buffer_stats = shared.buffer.stats();
        if buffer_stats.overflows > last_overflow_count
            && last_backpressure_log.map_or(true, |at| at.elapsed() >= BACKPRESSURE_LOG_INTERVAL)
        {
            warn!(
                "Frame buffer backpressure: {} overflows (+{}), {}/{} bytes occupied",
                buffer_stats.overflows,
                buffer_stats.overflows - last_overflow_count,
                buffer_stats.occupied,
                buffer_stats.capacity
            );
            shared.broadcast_event(PlaybackEvent::Backpressure {
                overflow_count: buffer_stats.overflows,
                occupied_bytes: buffer_stats.occupied,
                capacity_bytes: buffer_stats.capacity,
                timestamp: chrono::Utc::now(),
            });
            last_overflow_count = buffer_stats.overflows;
            last_backpressure_log = Some(Instant::now());
        }

        let state = shared.playback_state();
        if state != PlaybackState::Idle
            && last_position_event.elapsed() >= config.position_event_interval()
        {
            if let Some(track) = controller.current_track() {
                let position_ms = shared.tracker.current_position_ms();
                trace!("Position: {}ms / {}ms", position_ms, track.duration_ms());
                shared.broadcast_event(PlaybackEvent::PlaybackPosition {
                    track_id: track.id,
                    position_ms,
                    duration_ms: track.duration_ms(),
                    playing: state == PlaybackState::Playing,
                    timestamp: chrono::Utc::now(),
                });
            }
            last_position_event = Instant::now();
        }
    }

    debug!("Playback monitoring task stopped");
}
