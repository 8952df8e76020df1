//! Prefetch scheduling
//!
//! At most one request per tick, chosen in priority order:
//! 1. the current frame
//! 2. the forward window, nearest first
//! 3. the backward window, oldest first

use tracing::debug;

use crate::net::protocol::GameId;
use crate::net::provider::FrameProvider;
use crate::playback::cache::{FrameCache, RetentionWindow};

#[derive(Debug, Clone, Copy, Default)]
pub struct FetchScheduler {
    window: RetentionWindow,
}

impl FetchScheduler {
    pub fn new(window: RetentionWindow) -> Self {
        Self { window }
    }

    #[inline]
    pub fn window(&self) -> RetentionWindow {
        self.window
    }

    /// Pick the next frame to request, if any
    pub fn next_request<P>(
        &self,
        current: usize,
        frame_count: usize,
        cache: &FrameCache<P>,
    ) -> Option<usize> {
        if cache.is_absent(current) {
            return Some(current);
        }

        let forward_end = current.saturating_add(self.window.forward).min(frame_count);
        let forward = (current + 1..=forward_end).find(|&i| cache.is_absent(i));
        if forward.is_some() {
            return forward;
        }

        let back_start = current.saturating_sub(self.window.back);
        (back_start..current).find(|&i| cache.is_absent(i))
    }

    /// Pick the next frame, mark it pending and send the request
    pub fn schedule<P, F: FrameProvider + ?Sized>(
        &self,
        game_id: GameId,
        current: usize,
        frame_count: usize,
        cache: &mut FrameCache<P>,
        provider: &mut F,
    ) -> Option<usize> {
        let index = self.next_request(current, frame_count, cache)?;
        if !cache.mark_pending(index) {
            return None;
        }
        debug!("Requesting frame {} of game {}", index, game_id);
        provider.request_frame(game_id, index);
        Some(index)
    }
}
