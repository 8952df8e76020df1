//! User playback controls
//!
//! Maps key presses to clock commands. Rate changes step along a fixed
//! ladder of multipliers.

use crate::constants::controls::{DEFAULT_RATE_INDEX, LONG_SKIP_MS, RATES, SHORT_SKIP_MS};
use crate::playback::clock::TimeSource;
use crate::playback::engine::PlaybackEngine;
use crate::playback::PlaybackError;

/// A user command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    TogglePlay,
    Faster,
    Slower,
    Restart,
    SkipBackLong,
    SkipBackShort,
    SkipForwardShort,
    SkipForwardLong,
}

impl ControlAction {
    /// Key binding lookup. Arrow keys are spelled `up`, `down`, `left`, `right`.
    pub fn from_key(key: &str) -> Option<Self> {
        let action = match key.trim().to_ascii_lowercase().as_str() {
            "j" => ControlAction::SkipBackLong,
            "k" | "space" => ControlAction::TogglePlay,
            "l" => ControlAction::SkipForwardLong,
            ">" | "." | "up" => ControlAction::Faster,
            "<" | "," | "down" => ControlAction::Slower,
            "r" => ControlAction::Restart,
            "left" => ControlAction::SkipBackShort,
            "right" => ControlAction::SkipForwardShort,
            _ => return None,
        };
        Some(action)
    }
}

/// Rate ladder position plus the command helpers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackControls {
    rate_index: usize,
}

impl Default for PlaybackControls {
    fn default() -> Self {
        Self {
            rate_index: DEFAULT_RATE_INDEX,
        }
    }
}

impl PlaybackControls {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn rate_index(&self) -> usize {
        self.rate_index
    }

    #[inline]
    pub fn rate(&self) -> f64 {
        RATES[self.rate_index]
    }

    pub fn apply<T: TimeSource>(
        &mut self,
        action: ControlAction,
        engine: &mut PlaybackEngine<T>,
    ) -> Result<(), PlaybackError> {
        match action {
            ControlAction::TogglePlay => self.toggle_play(engine),
            ControlAction::Faster => return self.faster(engine).map(|_| ()),
            ControlAction::Slower => return self.slower(engine).map(|_| ()),
            ControlAction::Restart => self.restart(engine),
            ControlAction::SkipBackLong => self.skip(engine, -LONG_SKIP_MS),
            ControlAction::SkipBackShort => self.skip(engine, -SHORT_SKIP_MS),
            ControlAction::SkipForwardShort => self.skip(engine, SHORT_SKIP_MS),
            ControlAction::SkipForwardLong => self.skip(engine, LONG_SKIP_MS),
        }
        Ok(())
    }

    /// Start or pause. A replay paused on its last frame starts over.
    pub fn toggle_play<T: TimeSource>(&mut self, engine: &mut PlaybackEngine<T>) {
        if !engine.clock().is_paused() {
            engine.queue_pause();
            return;
        }
        if engine.is_at_end() {
            engine.queue_reset();
            self.rate_index = DEFAULT_RATE_INDEX;
        }
        engine.queue_start();
    }

    /// Step up the rate ladder. Returns false at the top.
    pub fn faster<T: TimeSource>(
        &mut self,
        engine: &mut PlaybackEngine<T>,
    ) -> Result<bool, PlaybackError> {
        if self.rate_index + 1 >= RATES.len() {
            return Ok(false);
        }
        engine.set_rate(RATES[self.rate_index + 1])?;
        self.rate_index += 1;
        Ok(true)
    }

    /// Step down the rate ladder. Returns false at the bottom.
    pub fn slower<T: TimeSource>(
        &mut self,
        engine: &mut PlaybackEngine<T>,
    ) -> Result<bool, PlaybackError> {
        if self.rate_index == 0 {
            return Ok(false);
        }
        engine.set_rate(RATES[self.rate_index - 1])?;
        self.rate_index -= 1;
        Ok(true)
    }

    /// Jump relative to the last applied game time
    pub fn skip<T: TimeSource>(&mut self, engine: &mut PlaybackEngine<T>, delta_ms: f64) {
        let target = engine.clock().elapsed_ms() + delta_ms;
        engine.queue_set_time(target);
    }

    /// Seek bar: jump to `fraction` of the replay
    pub fn seek_fraction<T: TimeSource>(&mut self, engine: &mut PlaybackEngine<T>, fraction: f64) {
        let fraction = if fraction.is_nan() {
            0.0
        } else {
            fraction.clamp(0.0, 1.0)
        };
        engine.queue_set_time(fraction * engine.duration_ms());
    }

    /// Back to the first frame at the default rate, playing
    pub fn restart<T: TimeSource>(&mut self, engine: &mut PlaybackEngine<T>) {
        engine.queue_reset();
        self.rate_index = DEFAULT_RATE_INDEX;
        engine.queue_start();
    }
}
