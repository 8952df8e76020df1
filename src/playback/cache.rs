//! Sliding-window frame cache
//!
//! Frames move `Absent -> Pending -> Resident` and drop back to `Absent`
//! on eviction. An index is never both pending and resident.

use std::ops::Range;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::constants::window;
use crate::net::protocol::FramePayload;

/// Cache state of a single frame index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Absent,
    /// Requested, response not yet received
    Pending,
    Resident,
}

/// Outcome of offering a response to the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Stored as resident
    Stored,
    /// Was pending, but the window moved past it; dropped
    OutsideWindow,
    /// Not pending (duplicate or unsolicited); dropped
    NotPending,
    /// Response for a game other than the one being viewed; dropped before
    /// reaching the cache
    OtherGame,
}

/// Range of frames retained around the current frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionWindow {
    pub back: usize,
    pub forward: usize,
}

impl Default for RetentionWindow {
    fn default() -> Self {
        Self {
            back: window::BACK,
            forward: window::FORWARD,
        }
    }
}

impl RetentionWindow {
    pub fn new(back: usize, forward: usize) -> Self {
        Self { back, forward }
    }

    /// `center - back <= index <= center + forward`, without underflow
    #[inline]
    pub fn contains(&self, center: usize, index: usize) -> bool {
        index.saturating_add(self.back) >= center && index <= center.saturating_add(self.forward)
    }
}

/// Resident frames plus the set of in-flight requests
#[derive(Debug)]
pub struct FrameCache<P = FramePayload> {
    resident: FxHashMap<usize, P>,
    pending: FxHashSet<usize>,
}

impl<P> Default for FrameCache<P> {
    fn default() -> Self {
        Self {
            resident: FxHashMap::default(),
            pending: FxHashSet::default(),
        }
    }
}

impl<P> FrameCache<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, index: usize) -> FrameState {
        if self.resident.contains_key(&index) {
            FrameState::Resident
        } else if self.pending.contains(&index) {
            FrameState::Pending
        } else {
            FrameState::Absent
        }
    }

    /// Read-only access for the renderer
    #[inline]
    pub fn get(&self, index: usize) -> Option<&P> {
        self.resident.get(&index)
    }

    #[inline]
    pub fn is_resident(&self, index: usize) -> bool {
        self.resident.contains_key(&index)
    }

    #[inline]
    pub fn is_pending(&self, index: usize) -> bool {
        self.pending.contains(&index)
    }

    /// Neither resident nor pending
    #[inline]
    pub fn is_absent(&self, index: usize) -> bool {
        !self.is_resident(index) && !self.is_pending(index)
    }

    /// Record an outgoing request.
    ///
    /// Returns false (and changes nothing) if the index is already pending
    /// or resident.
    pub fn mark_pending(&mut self, index: usize) -> bool {
        if !self.is_absent(index) {
            return false;
        }
        self.pending.insert(index)
    }

    /// Offer a response for `index` while the display is at `center`
    pub fn admit(
        &mut self,
        index: usize,
        payload: P,
        center: usize,
        window: RetentionWindow,
    ) -> Admission {
        if !self.pending.remove(&index) {
            return Admission::NotPending;
        }
        if !window.contains(center, index) {
            return Admission::OutsideWindow;
        }
        self.resident.insert(index, payload);
        Admission::Stored
    }

    /// Drop every resident frame outside the window. Pending requests are
    /// left alone. Returns the number of frames evicted.
    pub fn evict_outside(&mut self, center: usize, window: RetentionWindow) -> usize {
        let before = self.resident.len();
        self.resident.retain(|&index, _| window.contains(center, index));
        before - self.resident.len()
    }

    #[inline]
    pub fn resident_len(&self) -> usize {
        self.resident.len()
    }

    #[inline]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Resident indices in ascending order
    pub fn resident_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self.resident.keys().copied().collect();
        indices.sort_unstable();
        indices
    }

    /// Pending indices in ascending order
    pub fn pending_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self.pending.iter().copied().collect();
        indices.sort_unstable();
        indices
    }

    /// Contiguous runs of resident frames, for drawing loaded segments on a
    /// seek bar
    pub fn resident_runs(&self) -> Vec<Range<usize>> {
        let mut runs: Vec<Range<usize>> = Vec::new();
        for index in self.resident_indices() {
            match runs.last_mut() {
                Some(run) if run.end == index => run.end = index + 1,
                _ => runs.push(index..index + 1),
            }
        }
        runs
    }

    /// Forget everything (session teardown)
    pub fn clear(&mut self) {
        self.resident.clear();
        self.pending.clear();
    }
}
