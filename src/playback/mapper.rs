//! Time-to-frame quantization
//!
//! Walks the previous frame index forwards or backwards until it brackets
//! the clock's elapsed time, then clamps to `[0, frame_count]`. Clamping at
//! either boundary pins and pauses the clock.

use crate::playback::clock::{LogicalClock, TimeSource};
use crate::playback::PlaybackError;

/// Discrete playback position derived from clock time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackPosition {
    /// Frame currently displayed, in `[0, frame_count]`
    pub frame_index: usize,
    /// Progress through the current frame, in `[0, 1)`; 0 at the last frame
    pub fraction: f64,
}

impl PlaybackPosition {
    pub const START: Self = Self {
        frame_index: 0,
        fraction: 0.0,
    };
}

impl Default for PlaybackPosition {
    fn default() -> Self {
        Self::START
    }
}

/// Converts elapsed game time into a frame index for one game
#[derive(Debug, Clone, Copy)]
pub struct FrameIndexMapper {
    frame_period_ms: f64,
    frame_count: usize,
}

impl FrameIndexMapper {
    pub fn new(frame_period_ms: f64, frame_count: usize) -> Result<Self, PlaybackError> {
        if !frame_period_ms.is_finite() || frame_period_ms <= 0.0 {
            return Err(PlaybackError::InvalidFramePeriod(frame_period_ms));
        }
        Ok(Self {
            frame_period_ms,
            frame_count,
        })
    }

    #[inline]
    pub fn frame_period_ms(&self) -> f64 {
        self.frame_period_ms
    }

    /// Index of the terminal frame
    #[inline]
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Game time at which `frame_index` begins
    #[inline]
    pub fn frame_start_ms(&self, frame_index: usize) -> f64 {
        frame_index as f64 * self.frame_period_ms
    }

    /// Total game time of the replay
    #[inline]
    pub fn duration_ms(&self) -> f64 {
        self.frame_start_ms(self.frame_count)
    }

    /// Derive the position for the clock's current time, starting from the
    /// previous tick's index.
    ///
    /// Forces the clock to a paused, pinned state when the time falls
    /// outside the replay.
    pub fn map<T: TimeSource>(
        &self,
        previous_index: usize,
        clock: &mut LogicalClock<T>,
    ) -> PlaybackPosition {
        let elapsed = clock.elapsed_ms();
        let last = self.frame_count;

        if elapsed < 0.0 {
            clock.clamp_paused(0.0);
            return PlaybackPosition::START;
        }

        let mut index = previous_index.min(last);
        // Catch up over long ticks and forward seeks
        while index <= last && elapsed >= self.frame_start_ms(index + 1) {
            index += 1;
        }
        // Walk back after backward seeks
        while index > 0 && self.frame_start_ms(index) > elapsed {
            index -= 1;
        }

        if index >= last {
            clock.clamp_paused(self.duration_ms());
            return PlaybackPosition {
                frame_index: last,
                fraction: 0.0,
            };
        }

        let fraction = (elapsed - self.frame_start_ms(index)) / self.frame_period_ms;
        PlaybackPosition {
            frame_index: index,
            fraction: fraction.clamp(0.0, 1.0 - f64::EPSILON),
        }
    }
}
