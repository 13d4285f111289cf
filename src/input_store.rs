//! Frame-indexed input store: one ring per player, holding the most recent
//! `rollback + delay + 1` frames of [`InputTokenSet`].
//!
//! Local inputs are written through [`FrameInputStore::set_local`], remote
//! inputs through [`FrameInputStore::apply_remote_packet`]. [`FrameInputStore::get`]
//! resolves a read for any frame in the window to a `(InputTokenSet,
//! InputStatus)` pair, predicting ahead of the last confirmed frame by
//! repeating it rather than surfacing starvation immediately — only once the
//! gap exceeds `delay + leniency` frames does a read report [`InputStatus::Missing`].

use crate::error::{ApplyPacketOutcome, RollbackError, RollbackResult};
use crate::ids::FrameIndex;
use crate::packet::DecodedPacket;
use crate::token_set::InputTokenSet;

/// Whether a value returned by [`FrameInputStore::get`] came from an
/// authoritative write, a prediction, or neither.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InputStatus {
    /// The slot was written by `set_local` or an accepted remote packet.
    Confirmed,
    /// No authoritative value yet; the store repeated the last confirmed
    /// input (or the empty set, if none has ever been confirmed).
    Predicted,
    /// The gap since the last confirmed frame exceeds the configured
    /// leniency; the caller should treat this as starvation.
    Missing,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    frame: Option<FrameIndex>,
    input: InputTokenSet,
}

impl Default for Slot {
    fn default() -> Self {
        Slot {
            frame: None,
            input: InputTokenSet::EMPTY,
        }
    }
}

/// Per-(System, Player) ring of confirmed/predicted input, sized
/// `rollback + delay + 1` per [`crate::config::Configuration::input_ring_capacity`].
#[derive(Debug)]
pub struct FrameInputStore {
    rollback_window: u16,
    delay_frames: u16,
    leniency_frames: u16,
    slots: Vec<Slot>,
    current_frame: FrameIndex,
    stored_anchor_frame: Option<FrameIndex>,
    last_confirmed_frame: Option<FrameIndex>,
    last_confirmed_input: InputTokenSet,
}

impl FrameInputStore {
    /// Builds an empty store sized for the given window, synced to
    /// `current_frame`.
    #[must_use]
    pub fn new(rollback_window: u16, delay_frames: u16, leniency_frames: u16, current_frame: FrameIndex) -> Self {
        let capacity = usize::from(rollback_window) + usize::from(delay_frames) + 1;
        Self {
            rollback_window,
            delay_frames,
            leniency_frames,
            slots: vec![Slot::default(); capacity],
            current_frame,
            stored_anchor_frame: None,
            last_confirmed_frame: None,
            last_confirmed_input: InputTokenSet::EMPTY,
        }
    }

    fn index_of(&self, frame: FrameIndex) -> usize {
        usize::from(frame.as_u16()) % self.slots.len()
    }

    /// The `[current - rollback, current + delay]` window this store accepts
    /// writes and meaningful reads for.
    #[must_use]
    pub fn window(&self) -> (FrameIndex, FrameIndex) {
        (
            self.current_frame.wrapping_sub(self.rollback_window),
            self.current_frame.wrapping_add(self.delay_frames),
        )
    }

    /// Re-syncs the store's notion of "current" without touching slot
    /// contents, e.g. after `sync_with_remote_frame_index`.
    pub fn resync(&mut self, current_frame: FrameIndex) {
        self.current_frame = current_frame;
    }

    /// Writes the local player's input for `frame`, which must lie in
    /// `[current + 1, current + delay]`.
    ///
    /// # Errors
    ///
    /// Returns [`RollbackError::OutOfWindow`] if `frame` is outside that
    /// range, including whenever `delay_frames == 0` (there is then no
    /// pre-fillable window ahead of `current`; the System writes the local
    /// input for `current + 1` directly as part of advancing).
    pub fn set_local(&mut self, frame: FrameIndex, input: InputTokenSet) -> RollbackResult<()> {
        let low = self.current_frame.wrapping_add(1);
        let high = self.current_frame.wrapping_add(self.delay_frames);
        if self.delay_frames == 0 || !frame.in_window(low, high) {
            return Err(RollbackError::OutOfWindow { frame, window: low..=high });
        }
        self.write_slot(frame, input);
        Ok(())
    }

    /// Writes a local or newly-simulated input for `frame` without the
    /// `set_local` window check. Used by `System` when it advances the
    /// simulation: at that point `frame` is always the new current frame and
    /// is valid by construction.
    pub(crate) fn confirm_for_advance(&mut self, frame: FrameIndex, input: InputTokenSet) {
        self.write_slot(frame, input);
    }

    fn write_slot(&mut self, frame: FrameIndex, input: InputTokenSet) {
        let idx = self.index_of(frame);
        self.slots[idx] = Slot {
            frame: Some(frame),
            input,
        };
        let is_newer = self.last_confirmed_frame.is_none_or(|last| frame.distance_from(last) > 0);
        if is_newer {
            self.last_confirmed_frame = Some(frame);
            self.last_confirmed_input = input;
        }
    }

    /// Applies a decoded remote packet, overwriting every in-window frame it
    /// covers. Packets whose anchor frame is not newer than the last one
    /// accepted are discarded as [`ApplyPacketOutcome::Stale`].
    ///
    /// A frame is marked dirty when the arriving value disagrees with
    /// whatever was previously authoritative for it, *or* — for a frame at
    /// or before `current_frame`, i.e. one already handed to the simulation
    /// — with whatever prediction [`FrameInputStore::get`] last served for
    /// it. The first-ever authoritative value for an already-simulated
    /// frame can still contradict the predicted-empty/repeat value the
    /// simulation actually consumed, and that must roll back just the same
    /// as an authoritative value flipping.
    pub fn apply_remote_packet(&mut self, packet: &DecodedPacket) -> ApplyPacketOutcome {
        if let Some(stored) = self.stored_anchor_frame {
            if packet.anchor_frame.distance_from(stored) <= 0 {
                return ApplyPacketOutcome::Stale;
            }
        }

        let (low, high) = self.window();
        let oldest = packet.oldest_frame();

        // Capture what each touched frame previously resolved to before any
        // writes from this packet land, so a later frame in the same packet
        // never compares against a prediction this same packet already
        // changed.
        let mut previous_values: Vec<Option<InputTokenSet>> = Vec::with_capacity(packet.frames.len());
        for (offset, _) in packet.frames.iter().enumerate() {
            let offset = u16::try_from(offset).unwrap_or(u16::MAX);
            let frame = oldest.wrapping_add(offset);
            if !frame.in_window(low, high) {
                previous_values.push(None);
                continue;
            }
            let idx = self.index_of(frame);
            let previous = if self.slots[idx].frame == Some(frame) {
                Some(self.slots[idx].input)
            } else if frame.distance_from(self.current_frame) <= 0 {
                Some(self.get(frame).0)
            } else {
                None
            };
            previous_values.push(previous);
        }

        let mut touched_any = false;
        let mut oldest_dirty: Option<FrameIndex> = None;

        for (offset, &input) in packet.frames.iter().enumerate() {
            let frame_offset = u16::try_from(offset).unwrap_or(u16::MAX);
            let frame = oldest.wrapping_add(frame_offset);
            if !frame.in_window(low, high) {
                continue;
            }
            touched_any = true;

            let value_changed = previous_values[offset].is_some_and(|previous| previous != input);

            self.write_slot(frame, input);

            if value_changed {
                oldest_dirty = Some(match oldest_dirty {
                    Some(existing) if existing.distance_from(frame) <= 0 => existing,
                    _ => frame,
                });
            }
        }

        if !touched_any {
            return ApplyPacketOutcome::OutOfWindow;
        }

        self.stored_anchor_frame = Some(packet.anchor_frame);
        match oldest_dirty {
            Some(frame) => ApplyPacketOutcome::SuccessDirty { oldest_dirty: frame },
            None => ApplyPacketOutcome::Success,
        }
    }

    /// Resolves a read for `frame`: an authoritative slot is `Confirmed`; a
    /// frame past the last confirmed one but within `delay + leniency` is
    /// `Predicted` by repeating the last confirmed input; anything further
    /// out is `Missing`.
    #[must_use]
    pub fn get(&self, frame: FrameIndex) -> (InputTokenSet, InputStatus) {
        let idx = self.index_of(frame);
        let slot = self.slots[idx];
        if slot.frame == Some(frame) {
            return (slot.input, InputStatus::Confirmed);
        }

        let Some(last) = self.last_confirmed_frame else {
            return (InputTokenSet::EMPTY, InputStatus::Missing);
        };
        let lag = frame.distance_from(last);
        let grace = i32::from(self.delay_frames) + i32::from(self.leniency_frames);
        if (0..=grace).contains(&lag) {
            (self.last_confirmed_input, InputStatus::Predicted)
        } else {
            (InputTokenSet::EMPTY, InputStatus::Missing)
        }
    }

    /// The most recent frame this store has an authoritative value for.
    #[must_use]
    pub fn last_confirmed_frame(&self) -> Option<FrameIndex> {
        self.last_confirmed_frame
    }

    /// Drops all recorded state, as if newly constructed at `current_frame`.
    pub fn reset(&mut self, current_frame: FrameIndex) {
        self.slots.iter_mut().for_each(|slot| *slot = Slot::default());
        self.current_frame = current_frame;
        self.stored_anchor_frame = None;
        self.last_confirmed_frame = None;
        self.last_confirmed_input = InputTokenSet::EMPTY;
    }
}
