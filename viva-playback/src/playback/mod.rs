//! Buffering engine between the session and the render callback

pub mod callback_monitor;
pub mod controller;
pub mod frame_buffer;
pub mod monitor;
pub mod position;
pub mod render_bridge;
pub mod session_bridge;

pub use callback_monitor::{CallbackMonitor, CallbackStats};
pub use controller::PlaybackController;
pub use frame_buffer::{BufferStats, DequeueOutcome, EnqueueError, FrameBuffer};
pub use monitor::MonitorHandle;
pub use position::PositionTracker;
pub use render_bridge::{RenderBridge, RenderOutcome};
pub use session_bridge::{FrameDelivery, SessionBridge};
