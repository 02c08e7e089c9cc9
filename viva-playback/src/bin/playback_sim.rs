//! Playback simulator - drives the engine with a synthetic session
//!
//! A producer thread decodes a sine tone into 16-bit stereo chunks and
//! posts them through a channel drained by `SessionBridge::pump`. A render
//! thread pulls fixed-size callbacks on the hardware cadence. Events and
//! monitoring output go to the log.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;
use viva_common::PlaybackState;
use viva_playback::{
    AudioFormat, PlaybackConfig, PlaybackContext, PlaybackController, PlaybackSession, SeekRejection,
    SessionBridge, SessionEvent, Track,
};

/// Frames per decoded chunk
const CHUNK_FRAMES: u64 = 1024;

/// Command-line arguments for playback-sim
#[derive(Parser, Debug)]
#[command(name = "playback-sim")]
#[command(about = "Drive the Viva playback bridge with a synthetic session")]
#[command(version)]
struct Args {
    /// Path to playback.toml
    #[arg(short, long, env = "VIVA_CONFIG")]
    config: Option<PathBuf>,

    /// Length of the synthetic track in seconds
    #[arg(short, long, default_value = "10")]
    seconds: u64,

    /// Seek to this position (seconds) halfway through playback
    #[arg(long, allow_hyphen_values = true)]
    seek: Option<f64>,

    /// Session refuses every seek
    #[arg(long)]
    unseekable: bool,

    /// Frames requested per render callback
    #[arg(long, default_value = "512")]
    callback_frames: u32,
}

/// Synthetic session: a decode cursor the producer thread advances
struct SimSession {
    track: Track,
    cursor_frames: AtomicU64,
    stopped: AtomicBool,
    unseekable: bool,
}

impl PlaybackSession for SimSession {
    fn seek(&self, position: Duration) -> std::result::Result<(), SeekRejection> {
        if self.unseekable {
            return Err(SeekRejection::new("stream is not seekable"));
        }
        let frames = viva_common::timing::duration_to_frames(position, self.track.format.sample_rate);
        self.cursor_frames.store(frames, Ordering::SeqCst);
        Ok(())
    }

    fn current_track(&self) -> Option<Track> {
        Some(self.track.clone())
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// Decode loop: one chunk per iteration, paced by buffer fill
fn run_producer(session: Arc<SimSession>, bridge: SessionBridge, tx: mpsc::Sender<SessionEvent>) {
    let format = session.track.format;
    let total_frames =
        viva_common::timing::duration_to_frames(session.track.duration, format.sample_rate);

    bridge.on_track_started(session.track.clone());

    while !session.stopped.load(Ordering::SeqCst) {
        // Tag before reading the cursor: a seek in between makes the chunk stale
        let generation = bridge.current_generation();
        let start = session.cursor_frames.fetch_add(CHUNK_FRAMES, Ordering::SeqCst);
        if start >= total_frames {
            break;
        }
        let frames = CHUNK_FRAMES.min(total_frames - start);

        let mut data = Vec::with_capacity(frames as usize * format.bytes_per_frame());
        for n in start..start + frames {
            let t = n as f64 / format.sample_rate as f64;
            let sample = ((t * 440.0 * std::f64::consts::TAU).sin() * 8000.0) as i16;
            for _ in 0..format.channels {
                data.extend_from_slice(&sample.to_le_bytes());
            }
        }

        let event = SessionEvent::FrameAvailable { data, generation };
        if tx.send(event).is_err() {
            return;
        }

        // Decode faster than realtime but not unboundedly ahead
        thread::sleep(Duration::from_millis(5));
    }

    if !session.stopped.load(Ordering::SeqCst) {
        let _ = tx.send(SessionEvent::TrackEnded);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "viva_playback=debug,playback_sim=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let config = PlaybackConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    let track = Track::new(Uuid::new_v4(), Duration::from_secs(args.seconds), AudioFormat::CD)
        .with_name("Sine 440 Hz");
    let session = Arc::new(SimSession {
        track: track.clone(),
        cursor_frames: AtomicU64::new(0),
        stopped: AtomicBool::new(false),
        unseekable: args.unseekable,
    });

    let controller = PlaybackController::new(session.clone(), config)
        .context("Failed to create playback controller")?;
    controller.begin_context(PlaybackContext::new("Simulator"));

    let monitor = controller.start_monitoring(&tokio::runtime::Handle::current());

    let mut events = controller.subscribe_events();
    let event_logger = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => info!("Event: {}", json),
                Err(e) => warn!("Unserializable event {}: {}", event.event_type(), e),
            }
        }
    });

    // Producer side: decoder thread feeding the pump thread
    let (tx, rx) = mpsc::channel();
    let pump_bridge = controller.session_bridge();
    let pump = thread::spawn(move || pump_bridge.pump(rx));
    let producer_session = Arc::clone(&session);
    let producer_bridge = controller.session_bridge();
    let producer = thread::spawn(move || run_producer(producer_session, producer_bridge, tx));

    // Consumer side: render thread on the hardware cadence
    let render_bridge = controller.render_bridge();
    let callback_frames = args.callback_frames as usize;
    render_bridge.set_expected_callback_frames(args.callback_frames, track.format.sample_rate);
    let render_running = Arc::new(AtomicBool::new(true));
    let render_flag = Arc::clone(&render_running);
    let render = thread::spawn(move || {
        let period = viva_common::timing::frames_to_duration(callback_frames as u64, track.format.sample_rate);
        let mut output = vec![0u8; callback_frames * track.format.bytes_per_frame()];
        while render_flag.load(Ordering::Relaxed) {
            render_bridge.render(&mut output, callback_frames);
            thread::sleep(period);
        }
    });

    if let Some(target) = args.seek {
        tokio::time::sleep(Duration::from_secs(args.seconds) / 2).await;
        match controller.seek_to_secs(target) {
            Ok(()) => info!("Seeked to {:.2}s", target),
            Err(e) => warn!("Seek failed: {}", e),
        }
    }

    // Wait for the track to end; give up a little after its nominal length
    let deadline = tokio::time::Instant::now() + Duration::from_secs(args.seconds * 2 + 2);
    while controller.state() != PlaybackState::Idle && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    info!(
        "Final position {:?}, buffer {:?}, callbacks {:?}",
        controller.current_track_position(),
        controller.buffer_stats(),
        controller.callback_stats()
    );

    controller.stop();
    render_running.store(false, Ordering::Relaxed);
    monitor.shutdown().await;
    event_logger.abort();

    tokio::task::spawn_blocking(move || {
        for (name, handle) in [("producer", producer), ("pump", pump), ("render", render)] {
            if handle.join().is_err() {
                warn!("{} thread panicked", name);
            }
        }
    })
    .await
    .context("Failed to join worker threads")?;

    info!("Simulation complete");
    Ok(())
}
