/// Frame cache window constants
pub mod window {
    /// Resident frames kept behind the current frame
    pub const BACK: usize = 80;
    /// Frames prefetched ahead of the current frame
    pub const FORWARD: usize = 120;
}

/// Timing constants
pub mod timing {
    /// Game time represented by one frame, in milliseconds
    pub const FRAME_PERIOD_MS: f64 = 1000.0;
    /// Viewer render loop rate in Hz
    pub const RENDER_RATE: u32 = 60;
}

/// Playback control constants
pub mod controls {
    /// Selectable playback rates, slowest first
    pub const RATES: [f64; 9] = [0.3, 0.5, 0.7, 1.0, 1.5, 2.0, 3.0, 5.0, 10.0];
    /// Index into `RATES` for normal speed
    pub const DEFAULT_RATE_INDEX: usize = 3;
    /// Short skip (arrow keys), in milliseconds of game time
    pub const SHORT_SKIP_MS: f64 = 5_000.0;
    /// Long skip (j / l), in milliseconds of game time
    pub const LONG_SKIP_MS: f64 = 10_000.0;
}

/// Network constants
pub mod net {
    /// Maximum framed message size; recorded frames of large boards run to
    /// hundreds of kilobytes
    pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;
    /// Default replay server port
    pub const DEFAULT_PORT: u16 = 8000;
    /// Default metrics port
    pub const DEFAULT_METRICS_PORT: u16 = 9090;
}
