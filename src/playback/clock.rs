//! Logical playback clock
//!
//! Accumulates game time from a real time source, scaled by a playback rate.
//! Start/pause/reset/seek requests are buffered and applied once per
//! [`LogicalClock::update`] in a fixed order: reset, set time, start, pause.
//! The rate is not buffered.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::playback::PlaybackError;

/// Source of real (wall-clock) time for the logical clock
pub trait TimeSource {
    /// Milliseconds since an arbitrary fixed origin. Must not go backwards.
    fn now_ms(&self) -> f64;
}

/// Monotonic system time, measured from construction
#[derive(Debug, Clone, Copy)]
pub struct MonotonicTime {
    origin: Instant,
}

impl MonotonicTime {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicTime {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicTime {
    #[inline]
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Manually driven time source for deterministic tests and benchmarks
///
/// Clones share the same underlying instant, so a test can keep a handle
/// and advance time while the clock owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualTime {
    now_ms: Arc<Mutex<f64>>,
}

impl ManualTime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward by `ms` milliseconds
    pub fn advance(&self, ms: f64) {
        *self.now_ms.lock() += ms.max(0.0);
    }
}

impl TimeSource for ManualTime {
    fn now_ms(&self) -> f64 {
        *self.now_ms.lock()
    }
}

/// Observable clock state after an update
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockState {
    /// Accumulated game time in milliseconds, never negative
    pub elapsed_ms: f64,
    /// Playback rate multiplier, always positive
    pub rate: f64,
    pub paused: bool,
}

impl Default for ClockState {
    fn default() -> Self {
        Self {
            elapsed_ms: 0.0,
            rate: 1.0,
            paused: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunCommand {
    Start,
    Pause,
}

/// Commands queued since the last update
#[derive(Debug, Clone, Default)]
struct CommandQueue {
    reset: bool,
    set_time: Option<f64>,
    /// Start and pause exclude each other; the later request wins
    run: Option<RunCommand>,
}

impl CommandQueue {
    fn is_empty(&self) -> bool {
        !self.reset && self.set_time.is_none() && self.run.is_none()
    }
}

/// Game-time clock with deferred commands
#[derive(Debug)]
pub struct LogicalClock<T: TimeSource = MonotonicTime> {
    time: T,
    state: ClockState,
    last_sample_ms: f64,
    queue: CommandQueue,
}

impl LogicalClock<MonotonicTime> {
    /// Clock driven by the system monotonic clock
    pub fn system() -> Self {
        Self::new(MonotonicTime::new())
    }
}

impl<T: TimeSource> LogicalClock<T> {
    /// Create a paused clock at zero
    pub fn new(time: T) -> Self {
        let last_sample_ms = time.now_ms();
        Self {
            time,
            state: ClockState::default(),
            last_sample_ms,
            queue: CommandQueue::default(),
        }
    }

    /// State as of the last update
    #[inline]
    pub fn state(&self) -> ClockState {
        self.state
    }

    #[inline]
    pub fn elapsed_ms(&self) -> f64 {
        self.state.elapsed_ms
    }

    #[inline]
    pub fn rate(&self) -> f64 {
        self.state.rate
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.state.paused
    }

    /// Whether any command is waiting for the next update
    pub fn has_queued_commands(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Unpause at the next update
    pub fn queue_start(&mut self) {
        self.queue.run = Some(RunCommand::Start);
    }

    /// Pause at the next update
    pub fn queue_pause(&mut self) {
        self.queue.run = Some(RunCommand::Pause);
    }

    /// Reset to zero, rate 1, paused at the next update.
    ///
    /// Cancels any queued set-time or start.
    pub fn queue_reset(&mut self) {
        self.queue.reset = true;
        self.queue.set_time = None;
        if self.queue.run == Some(RunCommand::Start) {
            self.queue.run = None;
        }
    }

    /// Jump to `elapsed_ms` at the next update. Negative values clamp to 0.
    pub fn queue_set_time(&mut self, elapsed_ms: f64) {
        // f64::max maps NaN to 0 as well
        self.queue.set_time = Some(elapsed_ms.max(0.0));
    }

    /// Change the playback rate immediately
    pub fn set_rate(&mut self, rate: f64) -> Result<(), PlaybackError> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(PlaybackError::InvalidRate(rate));
        }
        self.state.rate = rate;
        Ok(())
    }

    /// Accumulate real time, then apply queued commands
    pub fn update(&mut self) -> ClockState {
        let now = self.time.now_ms();
        if !self.state.paused {
            let delta = (now - self.last_sample_ms).max(0.0);
            self.state.elapsed_ms += self.state.rate * delta;
        }
        self.last_sample_ms = now;

        if std::mem::take(&mut self.queue.reset) {
            self.state = ClockState::default();
        }
        if let Some(elapsed_ms) = self.queue.set_time.take() {
            self.state.elapsed_ms = elapsed_ms;
        }
        match self.queue.run.take() {
            Some(RunCommand::Start) => self.state.paused = false,
            Some(RunCommand::Pause) => self.state.paused = true,
            None => {}
        }

        self.state
    }

    /// Pin the clock at `elapsed_ms` and pause it, bypassing the queue.
    ///
    /// Reserved for the frame mapper's boundary clamp.
    pub(crate) fn clamp_paused(&mut self, elapsed_ms: f64) {
        self.state.elapsed_ms = elapsed_ms.max(0.0);
        self.state.paused = true;
        self.last_sample_ms = self.time.now_ms();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual_clock() -> (ManualTime, LogicalClock<ManualTime>) {
        let time = ManualTime::new();
        let clock = LogicalClock::new(time.clone());
        (time, clock)
    }

    #[test]
    fn test_new_clock_is_paused_at_zero() {
        let (_, clock) = manual_clock();
        assert_eq!(clock.state(), ClockState::default());
        assert!(clock.is_paused());
        assert_eq!(clock.rate(), 1.0);
    }

    #[test]
    fn test_paused_clock_does_not_advance() {
        let (time, mut clock) = manual_clock();
        time.advance(500.0);
        let state = clock.update();
        assert_eq!(state.elapsed_ms, 0.0);
    }

    #[test]
    fn test_commands_are_deferred_until_update() {
        let (time, mut clock) = manual_clock();
        clock.queue_start();
        clock.queue_set_time(2000.0);
        assert!(clock.is_paused());
        assert_eq!(clock.elapsed_ms(), 0.0);
        assert!(clock.has_queued_commands());

        // Time before the start command is not counted
        time.advance(1000.0);
        let state = clock.update();
        assert!(!state.paused);
        assert_eq!(state.elapsed_ms, 2000.0);
        assert!(!clock.has_queued_commands());
    }

    #[test]
    fn test_running_clock_accumulates_with_rate() {
        let (time, mut clock) = manual_clock();
        clock.queue_start();
        clock.update();

        time.advance(100.0);
        assert_eq!(clock.update().elapsed_ms, 100.0);

        clock.set_rate(2.5).unwrap();
        time.advance(100.0);
        assert_eq!(clock.update().elapsed_ms, 350.0);
    }

    #[test]
    fn test_set_rate_is_immediate() {
        let (_, mut clock) = manual_clock();
        clock.set_rate(3.0).unwrap();
        assert_eq!(clock.rate(), 3.0);
    }

    #[test]
    fn test_set_rate_rejects_non_positive() {
        let (_, mut clock) = manual_clock();
        assert!(matches!(clock.set_rate(0.0), Err(PlaybackError::InvalidRate(_))));
        assert!(clock.set_rate(-1.0).is_err());
        assert!(clock.set_rate(f64::NAN).is_err());
        assert!(clock.set_rate(f64::INFINITY).is_err());
        assert_eq!(clock.rate(), 1.0);
    }

    #[test]
    fn test_reset_restores_defaults() {
        let (time, mut clock) = manual_clock();
        clock.queue_start();
        clock.set_rate(5.0).unwrap();
        clock.update();
        time.advance(400.0);
        clock.update();
        assert_eq!(clock.elapsed_ms(), 2000.0);

        clock.queue_reset();
        let state = clock.update();
        assert_eq!(state, ClockState::default());
    }

    #[test]
    fn test_reset_cancels_earlier_set_time_and_start() {
        let (_, mut clock) = manual_clock();
        clock.queue_set_time(5000.0);
        clock.queue_start();
        clock.queue_reset();
        let state = clock.update();
        assert_eq!(state.elapsed_ms, 0.0);
        assert!(state.paused);
    }

    #[test]
    fn test_commands_after_reset_still_apply() {
        let (_, mut clock) = manual_clock();
        clock.queue_reset();
        clock.queue_set_time(1500.0);
        clock.queue_start();
        let state = clock.update();
        assert_eq!(state.elapsed_ms, 1500.0);
        assert!(!state.paused);
        assert_eq!(state.rate, 1.0);
    }

    #[test]
    fn test_start_and_pause_last_writer_wins() {
        let (_, mut clock) = manual_clock();
        clock.queue_start();
        clock.queue_pause();
        assert!(clock.update().paused);

        clock.queue_pause();
        clock.queue_start();
        assert!(!clock.update().paused);
    }

    #[test]
    fn test_set_time_order_independent_of_run_commands() {
        let (_, mut a) = manual_clock();
        a.queue_set_time(3000.0);
        a.queue_start();

        let (_, mut b) = manual_clock();
        b.queue_start();
        b.queue_set_time(3000.0);

        assert_eq!(a.update(), b.update());

        let (_, mut c) = manual_clock();
        c.queue_pause();
        c.queue_set_time(700.0);

        let (_, mut d) = manual_clock();
        d.queue_set_time(700.0);
        d.queue_pause();

        assert_eq!(c.update(), d.update());
    }

    #[test]
    fn test_set_time_wins_over_accumulation_in_same_tick() {
        let (time, mut clock) = manual_clock();
        clock.queue_start();
        clock.update();
        time.advance(250.0);
        clock.queue_set_time(100.0);
        assert_eq!(clock.update().elapsed_ms, 100.0);
    }

    #[test]
    fn test_negative_set_time_clamps_to_zero() {
        let (_, mut clock) = manual_clock();
        for t in [-1.0, -10_000.0, f64::NEG_INFINITY, f64::NAN] {
            clock.queue_set_time(t);
            let state = clock.update();
            assert_eq!(state.elapsed_ms, 0.0);
        }
    }

    #[test]
    fn test_set_time_does_not_start() {
        let (_, mut clock) = manual_clock();
        clock.queue_set_time(3500.0);
        let state = clock.update();
        assert_eq!(state.elapsed_ms, 3500.0);
        assert!(state.paused);
    }

    #[test]
    fn test_repeated_update_is_idempotent_without_time() {
        let (_, mut clock) = manual_clock();
        clock.queue_start();
        let first = clock.update();
        let second = clock.update();
        assert_eq!(first, second);
    }

    #[test]
    fn test_clamp_paused_pins_and_pauses() {
        let (time, mut clock) = manual_clock();
        clock.queue_start();
        clock.update();
        clock.clamp_paused(4000.0);
        assert!(clock.is_paused());
        assert_eq!(clock.elapsed_ms(), 4000.0);

        time.advance(1000.0);
        assert_eq!(clock.update().elapsed_ms, 4000.0);
    }

    #[test]
    fn test_monotonic_time_advances() {
        let time = MonotonicTime::new();
        let a = time.now_ms();
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(time.now_ms() > a);
    }
}
