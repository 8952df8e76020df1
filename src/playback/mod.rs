//! Replay playback engine
//!
//! Turns wall-clock time under pause/seek/rate commands into a frame index,
//! and keeps a prefetched window of frames around it.

pub mod cache;
pub mod clock;
pub mod controls;
pub mod engine;
pub mod mapper;
pub mod scheduler;
pub mod session;

pub use cache::{Admission, FrameCache, FrameState, RetentionWindow};
pub use clock::{ClockState, LogicalClock, ManualTime, MonotonicTime, TimeSource};
pub use controls::{ControlAction, PlaybackControls};
pub use engine::{EngineConfig, PlaybackEngine, TickReport};
pub use mapper::{FrameIndexMapper, PlaybackPosition};
pub use scheduler::FetchScheduler;
pub use session::{ViewerSession, ViewerStatus};

/// Invalid input to the playback engine
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlaybackError {
    #[error("Playback rate must be positive and finite, got {0}")]
    InvalidRate(f64),
    #[error("Frame period must be positive and finite, got {0}")]
    InvalidFramePeriod(f64),
}
