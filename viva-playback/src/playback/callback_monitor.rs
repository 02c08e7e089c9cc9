//! Render callback timing monitor for underrun and stutter detection
//!
//! Tracks render callback invocations to detect timing irregularities and
//! counts underruns. The render path only touches atomics here; the
//! monitoring task reads the counters and turns them into logs and events.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Callbacks sampled before the expected interval is recalibrated
const CALIBRATION_CALLBACKS: u64 = 100;

/// Minimum samples for a usable median
const CALIBRATION_MIN_SAMPLES: usize = 50;

/// Render callback timing monitor
///
/// Tracks every callback invocation to detect:
/// - Irregular callback intervals (timing jitter)
/// - Underrun events (even single occurrences)
///
/// **Design:** Lock-free on the render path
/// **Dynamic Calibration:** Learns the actual callback interval during the first 100 callbacks
#[derive(Debug)]
pub struct CallbackMonitor {
    /// Monotonic origin for elapsed-time stamps
    start_time: Instant,

    /// Last callback elapsed time (nanoseconds since start_time)
    last_callback_ns: AtomicU64,

    /// Total callback invocations
    callback_count: AtomicU64,

    /// Total underruns reported while audio was expected
    underrun_count: AtomicU64,

    /// Count of intervals deviating more than the tolerance
    irregular_intervals: AtomicU64,

    /// Expected interval between callbacks (nanoseconds), 0 until known
    expected_interval_ns: AtomicU64,

    /// Tolerance for irregular interval detection (nanoseconds)
    tolerance_ns: AtomicU64,

    /// Interval samples collected by the render path during calibration
    ///
    /// Pre-sized so pushes never allocate; the render path only uses try_lock.
    calibration_samples: Mutex<Vec<u64>>,

    calibration_complete: AtomicBool,

    /// Elapsed time (ns since start_time) of the latest track start
    track_started_ns: AtomicU64,
}

impl Default for CallbackMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl CallbackMonitor {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            last_callback_ns: AtomicU64::new(0),
            callback_count: AtomicU64::new(0),
            underrun_count: AtomicU64::new(0),
            irregular_intervals: AtomicU64::new(0),
            expected_interval_ns: AtomicU64::new(0),
            tolerance_ns: AtomicU64::new(0),
            calibration_samples: Mutex::new(Vec::with_capacity(CALIBRATION_CALLBACKS as usize)),
            calibration_complete: AtomicBool::new(false),
            track_started_ns: AtomicU64::new(0),
        }
    }

    /// Seed the expected interval from the hardware buffer size
    ///
    /// `frames_per_callback / sample_rate`, with 20% tolerance. Calibration
    /// replaces it with the measured median.
    pub fn set_expected_interval(&self, frames_per_callback: u32, sample_rate: u32) {
        if sample_rate == 0 || frames_per_callback == 0 {
            return;
        }
        let expected_ns = frames_per_callback as u64 * 1_000_000_000 / sample_rate as u64;
        self.expected_interval_ns.store(expected_ns, Ordering::Relaxed);
        self.tolerance_ns.store(expected_ns / 5, Ordering::Relaxed);

        info!(
            "CallbackMonitor expecting {:.2}ms intervals ({} frames @ {} Hz), calibrating...",
            expected_ns as f64 / 1_000_000.0,
            frames_per_callback,
            sample_rate
        );
    }

    /// Record callback invocation (call at start of the render callback)
    ///
    /// **REAL-TIME SAFE**: atomics and a non-blocking try_lock only
    pub fn record_callback(&self) {
        let now_ns = self.elapsed_ns();
        let last_ns = self.last_callback_ns.swap(now_ns, Ordering::Relaxed);
        let count = self.callback_count.fetch_add(1, Ordering::Relaxed);

        // First callback has no previous timestamp
        if count == 0 {
            return;
        }

        let actual_interval_ns = now_ns.saturating_sub(last_ns);

        if !self.calibration_complete.load(Ordering::Relaxed) && count <= CALIBRATION_CALLBACKS {
            if let Ok(mut samples) = self.calibration_samples.try_lock() {
                if samples.len() < samples.capacity() {
                    samples.push(actual_interval_ns);
                }
            }
        }

        let expected_interval_ns = self.expected_interval_ns.load(Ordering::Relaxed);
        if expected_interval_ns == 0 {
            return;
        }
        let tolerance_ns = self.tolerance_ns.load(Ordering::Relaxed);
        if actual_interval_ns.abs_diff(expected_interval_ns) > tolerance_ns {
            self.irregular_intervals.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record underrun event (render callback ran dry while audio was expected)
    ///
    /// **REAL-TIME SAFE**: atomic increment only
    pub fn record_underrun(&self) {
        self.underrun_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Note a track start so early underruns can be classified as startup
    pub fn mark_track_started(&self) {
        self.track_started_ns.store(self.elapsed_ns().max(1), Ordering::Relaxed);
    }

    /// True while still inside `grace` of the latest track start
    pub fn in_startup_grace(&self, grace: Duration) -> bool {
        let started = self.track_started_ns.load(Ordering::Relaxed);
        if started == 0 {
            return false;
        }
        self.elapsed_ns().saturating_sub(started) < grace.as_nanos() as u64
    }

    /// Get current statistics
    pub fn stats(&self) -> CallbackStats {
        CallbackStats {
            callback_count: self.callback_count.load(Ordering::Relaxed),
            underrun_count: self.underrun_count.load(Ordering::Relaxed),
            irregular_intervals: self.irregular_intervals.load(Ordering::Relaxed),
            expected_interval_ms: self.expected_interval_ns.load(Ordering::Relaxed) / 1_000_000,
            calibration_complete: self.calibration_complete.load(Ordering::Relaxed),
        }
    }

    /// Finalize calibration once enough samples exist (monitoring task only)
    ///
    /// Sets the expected interval to the median of the collected samples and
    /// the tolerance to 20% of it.
    pub(crate) fn check_calibration(&self) {
        if self.calibration_complete.load(Ordering::Relaxed) {
            return;
        }

        let mut sorted_samples = match self.calibration_samples.lock() {
            Ok(samples) if samples.len() >= CALIBRATION_MIN_SAMPLES => samples.clone(),
            Ok(samples) => {
                debug!(
                    "Calibration check: {} samples collected, {} callbacks so far",
                    samples.len(),
                    self.callback_count.load(Ordering::Relaxed)
                );
                return;
            }
            Err(_) => return,
        };

        sorted_samples.sort_unstable();
        let median_interval_ns = sorted_samples[sorted_samples.len() / 2];
        let new_tolerance_ns = median_interval_ns / 5;

        self.expected_interval_ns.store(median_interval_ns, Ordering::Relaxed);
        self.tolerance_ns.store(new_tolerance_ns, Ordering::Relaxed);
        self.calibration_complete.store(true, Ordering::Relaxed);

        info!(
            "CallbackMonitor calibration complete: measured_interval={:.2}ms (median of {} samples), tolerance={:.2}ms",
            median_interval_ns as f64 / 1_000_000.0,
            sorted_samples.len(),
            new_tolerance_ns as f64 / 1_000_000.0
        );
    }

    fn elapsed_ns(&self) -> u64 {
        self.start_time.elapsed().as_nanos() as u64
    }
}

/// Callback statistics snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CallbackStats {
    pub callback_count: u64,
    pub underrun_count: u64,
    pub irregular_intervals: u64,
    pub expected_interval_ms: u64,
    pub calibration_complete: bool,
}
