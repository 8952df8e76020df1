//! Per-game playback engine
//!
//! Owns the clock, the frame mapper, the frame cache and the scheduler for
//! one viewed game. Each [`PlaybackEngine::tick`] runs, in order: clock
//! update, frame mapping, eviction, scheduling. Responses admitted through
//! [`PlaybackEngine::on_frame_arrived`] before a tick are visible to that
//! tick's scheduling decision.

use tracing::{debug, info};

use crate::constants::timing;
use crate::net::protocol::{FramePayload, GameId, GameInfo};
use crate::net::provider::FrameProvider;
use crate::playback::cache::{Admission, FrameCache, RetentionWindow};
use crate::playback::clock::{ClockState, LogicalClock, MonotonicTime, TimeSource};
use crate::playback::mapper::{FrameIndexMapper, PlaybackPosition};
use crate::playback::scheduler::FetchScheduler;
use crate::playback::PlaybackError;

/// Engine settings shared by every game in a viewing session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    pub frame_period_ms: f64,
    pub window: RetentionWindow,
    /// Start playing as soon as the game header arrives
    pub autoplay: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frame_period_ms: timing::FRAME_PERIOD_MS,
            window: RetentionWindow::default(),
            autoplay: false,
        }
    }
}

impl EngineConfig {
    /// Reject settings no game could be played with
    pub fn validate(&self) -> Result<(), PlaybackError> {
        FrameIndexMapper::new(self.frame_period_ms, 0).map(|_| ())
    }
}

/// Outcome of one engine tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub position: PlaybackPosition,
    pub clock: ClockState,
    /// Frame requested this tick, if any
    pub requested: Option<usize>,
    /// Resident frames evicted this tick
    pub evicted: usize,
    /// The last frame was reached during this tick
    pub reached_end: bool,
}

pub struct PlaybackEngine<T: TimeSource = MonotonicTime> {
    info: GameInfo,
    clock: LogicalClock<T>,
    mapper: FrameIndexMapper,
    cache: FrameCache,
    scheduler: FetchScheduler,
    position: PlaybackPosition,
}

impl<T: TimeSource> PlaybackEngine<T> {
    pub fn new(info: GameInfo, config: EngineConfig, time: T) -> Result<Self, PlaybackError> {
        let mapper = FrameIndexMapper::new(config.frame_period_ms, info.frame_count)?;
        let mut clock = LogicalClock::new(time);
        if config.autoplay {
            clock.queue_start();
        }

        Ok(Self {
            info,
            clock,
            mapper,
            cache: FrameCache::new(),
            scheduler: FetchScheduler::new(config.window),
            position: PlaybackPosition::START,
        })
    }

    #[inline]
    pub fn game_id(&self) -> GameId {
        self.info.game_id
    }

    #[inline]
    pub fn info(&self) -> &GameInfo {
        &self.info
    }

    /// Index of the terminal frame
    #[inline]
    pub fn frame_count(&self) -> usize {
        self.mapper.frame_count()
    }

    #[inline]
    pub fn duration_ms(&self) -> f64 {
        self.mapper.duration_ms()
    }

    /// Position computed by the last tick
    #[inline]
    pub fn position(&self) -> PlaybackPosition {
        self.position
    }

    #[inline]
    pub fn clock(&self) -> &LogicalClock<T> {
        &self.clock
    }

    #[inline]
    pub fn cache(&self) -> &FrameCache {
        &self.cache
    }

    #[inline]
    pub fn window(&self) -> RetentionWindow {
        self.scheduler.window()
    }

    /// Displaying the terminal frame
    #[inline]
    pub fn is_at_end(&self) -> bool {
        self.position.frame_index >= self.frame_count()
    }

    /// Renderer lookup
    pub fn frame(&self, index: usize) -> Option<&FramePayload> {
        self.cache.get(index)
    }

    /// Payload for the current frame, or None while it is loading
    pub fn current_frame(&self) -> Option<&FramePayload> {
        self.cache.get(self.position.frame_index)
    }

    pub fn queue_start(&mut self) {
        self.clock.queue_start();
    }

    pub fn queue_pause(&mut self) {
        self.clock.queue_pause();
    }

    pub fn queue_reset(&mut self) {
        self.clock.queue_reset();
    }

    pub fn queue_set_time(&mut self, elapsed_ms: f64) {
        self.clock.queue_set_time(elapsed_ms);
    }

    pub fn set_rate(&mut self, rate: f64) -> Result<(), PlaybackError> {
        self.clock.set_rate(rate)
    }

    /// Response intake. Frames for another game, for indices not pending, or
    /// for indices the window has moved past are dropped.
    pub fn on_frame_arrived(
        &mut self,
        game_id: GameId,
        frame_num: usize,
        payload: FramePayload,
    ) -> Admission {
        if game_id != self.info.game_id {
            debug!(
                "Ignoring frame {} of game {} while viewing game {}",
                frame_num, game_id, self.info.game_id
            );
            return Admission::OtherGame;
        }

        let admission = self.cache.admit(
            frame_num,
            payload,
            self.position.frame_index,
            self.scheduler.window(),
        );
        match admission {
            Admission::Stored => {}
            Admission::OutsideWindow => {
                debug!(
                    "Discarding frame {}: outside window at frame {}",
                    frame_num, self.position.frame_index
                );
            }
            Admission::NotPending | Admission::OtherGame => {
                debug!("Discarding unrequested frame {}", frame_num);
            }
        }
        admission
    }

    /// Advance one render tick and issue at most one frame request
    pub fn tick<F: FrameProvider + ?Sized>(&mut self, provider: &mut F) -> TickReport {
        let was_at_end = self.is_at_end();

        let clock = self.clock.update();
        self.position = self.mapper.map(self.position.frame_index, &mut self.clock);

        let current = self.position.frame_index;
        let evicted = self.cache.evict_outside(current, self.scheduler.window());
        if evicted > 0 {
            debug!("Evicted {} frames around frame {}", evicted, current);
        }

        let requested = self.scheduler.schedule(
            self.info.game_id,
            current,
            self.frame_count(),
            &mut self.cache,
            provider,
        );

        let reached_end = !was_at_end && self.is_at_end();
        if reached_end {
            info!("Reached end of game {} at frame {}", self.info.game_id, current);
        }

        TickReport {
            position: self.position,
            // The mapper may have re-paused the clock after the update
            clock: ClockState {
                paused: self.clock.is_paused(),
                elapsed_ms: self.clock.elapsed_ms(),
                ..clock
            },
            requested,
            evicted,
            reached_end,
        }
    }
}
