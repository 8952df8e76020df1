//! Replay Viewer Library
//!
//! Plays back recorded games streamed frame by frame from a replay server.
//!
//! # Features
//!
//! - `server` - Replay log server: `.plog` loading, TCP serving, metrics endpoint (enabled by default)
//! - `dos_ratelimit` - Per-message rate limiting on the server (enabled by default)

pub mod config;
pub mod constants;
pub mod net;
pub mod playback;

// Feature-gated modules (enabled by default)
#[cfg(feature = "server")]
pub mod metrics;

#[cfg(feature = "server")]
pub mod store;
