//! The rollback controller: a tiny `{Idle, Rolling}` state machine plus the
//! pure anchor-selection search `System` drives when a dirty frame is
//! detected.
//!
//! The orchestration this state machine gates — undo activations back to the
//! anchor, restore state, re-simulate forward — touches the whole component
//! registry and lives on [`crate::system::System`] instead of here; this
//! module only owns the state transition and the anchor search, so both stay
//! independently testable without a full `System` in scope.

use crate::ids::FrameIndex;

/// Where the rollback controller currently is.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum RollbackState {
    /// No rollback in progress.
    #[default]
    Idle,
    /// Currently undoing activations and re-simulating back to the dirty
    /// frame's original current frame.
    Rolling,
}

/// Tracks the controller's state and the last anchor frame a rollback
/// restored to, for diagnostics.
#[derive(Debug, Default)]
pub struct RollbackController {
    state: RollbackState,
    last_anchor_frame: Option<FrameIndex>,
    episode_count: u64,
}

impl RollbackController {
    /// A fresh, idle controller.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> RollbackState {
        self.state
    }

    /// The anchor frame restored to by the most recently completed rollback.
    #[must_use]
    pub fn last_anchor_frame(&self) -> Option<FrameIndex> {
        self.last_anchor_frame
    }

    /// Total number of rollback episodes completed since construction or the
    /// last [`Self::reset`].
    #[must_use]
    pub fn episode_count(&self) -> u64 {
        self.episode_count
    }

    /// Marks the controller as entering a rollback episode.
    pub fn begin(&mut self) {
        self.state = RollbackState::Rolling;
    }

    /// Marks the episode complete, recording `anchor` as the restore point.
    pub fn finish(&mut self, anchor: FrameIndex) {
        self.state = RollbackState::Idle;
        self.last_anchor_frame = Some(anchor);
        self.episode_count += 1;
    }

    /// Drops all recorded history.
    pub fn reset(&mut self) {
        self.state = RollbackState::Idle;
        self.last_anchor_frame = None;
        self.episode_count = 0;
    }

    /// Searches `(window_start, dirty)` in reverse-chronological order for
    /// the most recent frame `is_clean` accepts, per invariant 6 ("anchor on
    /// the newest clean frame strictly before the dirty one").
    ///
    /// Returns `None` if no frame in range is clean, i.e. the dirty range
    /// covers the entire rollback window — callers should raise
    /// [`crate::error::RollbackError::UnrecoverableDivergence`] in that case.
    pub fn select_anchor(dirty: FrameIndex, window_start: FrameIndex, mut is_clean: impl FnMut(FrameIndex) -> bool) -> Option<FrameIndex> {
        let span = dirty.distance_from(window_start);
        if span <= 0 {
            return None;
        }
        for back in 1..=span {
            #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
            let candidate = dirty.wrapping_sub(back as u16);
            if is_clean(candidate) {
                return Some(candidate);
            }
        }
        None
    }
}
