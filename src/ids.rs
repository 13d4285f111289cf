//! Identity and frame-indexing primitives shared across the engine.
//!
//! [`FrameIndex`] is a wrapping `u16` counter of simulation frames. Frame
//! comparisons only ever make sense inside a sliding window much narrower
//! than `u16::MAX`, so arithmetic wraps silently and callers are expected to
//! reason about *distance* (see [`FrameIndex::distance_from`]) rather than
//! raw ordering once wraparound is possible.

use std::fmt;

/// A small integer naming one per-host [`crate::system::System`] instance.
///
/// Several co-hosted peers (chiefly test harnesses) may share a process, each
/// under its own `SystemIndex`; see [`crate::multiton`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct SystemIndex(pub u8);

impl fmt::Display for SystemIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "system#{}", self.0)
    }
}

/// Monotonic counter of simulation frames since a System was synced to a
/// start frame.
///
/// Wraps arithmetically at `u16::MAX`. All comparisons between two
/// `FrameIndex` values are only meaningful within a sliding window narrower
/// than `u16::MAX / 2`; use [`FrameIndex::distance_from`] rather than `<`/`>`
/// once wraparound is a possibility.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct FrameIndex(pub u16);

impl FrameIndex {
    /// The zero frame.
    pub const ZERO: FrameIndex = FrameIndex(0);

    /// Creates a new `FrameIndex`.
    #[must_use]
    pub const fn new(value: u16) -> Self {
        FrameIndex(value)
    }

    /// Returns the underlying `u16`.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Wrapping addition of `delta` frames.
    #[must_use]
    pub const fn wrapping_add(self, delta: u16) -> Self {
        FrameIndex(self.0.wrapping_add(delta))
    }

    /// Wrapping subtraction of `delta` frames.
    #[must_use]
    pub const fn wrapping_sub(self, delta: u16) -> Self {
        FrameIndex(self.0.wrapping_sub(delta))
    }

    /// Signed distance `self - other`, correct across a single wraparound.
    ///
    /// Only meaningful when the true distance between `self` and `other` is
    /// known to be within `i16::MIN..=i16::MAX`, which holds for any pair of
    /// frames inside a rollback window (windows are always far narrower than
    /// `u16::MAX / 2` in practice).
    #[must_use]
    pub fn distance_from(self, other: FrameIndex) -> i32 {
        i32::from(self.0.wrapping_sub(other.0) as i16)
    }

    /// `true` if `self` lies in the inclusive window `[low, high]`, measured
    /// by wraparound-aware distance from `low`.
    #[must_use]
    pub fn in_window(self, low: FrameIndex, high: FrameIndex) -> bool {
        let span = high.distance_from(low);
        if span < 0 {
            return false;
        }
        let offset = self.distance_from(low);
        (0..=span).contains(&offset)
    }
}

impl fmt::Display for FrameIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for FrameIndex {
    fn from(value: u16) -> Self {
        FrameIndex(value)
    }
}

impl From<FrameIndex> for u16 {
    fn from(frame: FrameIndex) -> Self {
        frame.0
    }
}

/// Uniquely names one simulated participant on a given [`crate::system::System`].
///
/// Immutable after creation: a player's identity never changes over its
/// lifetime, only its activation state.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct PlayerIdentity {
    /// Per-System unique player id.
    pub id: u16,
    /// `true` if inputs for this player originate on this host and must be
    /// uploaded; `false` if they are downloaded from a remote packet.
    pub local: bool,
    /// The frame at which this player joined the simulation.
    pub join_frame: FrameIndex,
    /// The System this identity belongs to.
    pub system_index: SystemIndex,
}

impl PlayerIdentity {
    /// Builds a new immutable player identity.
    #[must_use]
    pub const fn new(id: u16, local: bool, join_frame: FrameIndex, system_index: SystemIndex) -> Self {
        Self {
            id,
            local,
            join_frame,
            system_index,
        }
    }
}

impl fmt::Display for PlayerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "player#{} ({}) on {}",
            self.id,
            if self.local { "local" } else { "remote" },
            self.system_index
        )
    }
}


#[cfg(kani)]
mod kani_proofs {
    use super::*;

    #[kani::proof]
    fn proof_distance_roundtrip_within_i16_range() {
        let a: u16 = kani::any();
        let delta: i16 = kani::any();
        let b = FrameIndex(a).wrapping_add(delta as u16);
        kani::assert(
            b.distance_from(FrameIndex(a)) == i32::from(delta),
            "distance_from must recover the signed delta used to construct b",
        );
    }

    #[kani::proof]
    fn proof_in_window_reflexive() {
        let f: u16 = kani::any();
        let frame = FrameIndex(f);
        kani::assert(frame.in_window(frame, frame), "a frame is always within the single-frame window [f, f]");
    }
}
