//! The three component kinds user code registers with a [`crate::system::System`],
//! modeled as a shared lifecycle trait plus three capability supertraits.
//!
//! Each kind is owned by user code; the System holds a `Box<dyn _>` and
//! dispatches events into it. A single [`RollbackableComponent`] enum tags
//! which kind a given boxed handle is, so the registry can iterate one
//! `Vec` in deterministic registration order while still calling the
//! kind-specific methods.

use std::collections::BTreeMap;

use crate::fixed::Fixed;
use crate::ids::{FrameIndex, PlayerIdentity};
use crate::token_set::InputTokenSet;

/// Whether an activation callback fires during the frame's first simulation
/// or during a post-rollback re-simulation of that same frame.
///
/// Additive over the distilled protocol (see `SPEC_FULL.md` §1): the
/// ordering of *when* the callback fires is unchanged, this only tells user
/// code which of those two cases it is in.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ActivationStage {
    /// The owning frame is being simulated for the first time.
    FirstSimulation,
    /// The owning frame is being re-simulated after a rollback.
    Resimulation,
}

/// Whether an activation record turns a component on or off.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ActivationKind {
    /// Begin simulating this owner.
    Activate,
    /// Stop simulating this owner.
    Deactivate,
}

/// One scheduled activation or deactivation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ActivationRecord {
    /// The player this activation applies to.
    pub owner: PlayerIdentity,
    /// Activate or deactivate.
    pub kind: ActivationKind,
    /// The frame at which the change takes effect.
    pub frame: FrameIndex,
}

/// Lifecycle callbacks common to every rollbackable component kind.
///
/// Default (no-op) bodies are provided for the purely-informational hooks;
/// implementors only need to override the ones they care about.
pub trait Rollbackable {
    /// Fires during the re-simulation pass that visits `record.frame`, or
    /// during first simulation of that frame if no rollback was involved.
    fn on_activation_change(&mut self, record: ActivationRecord, stage: ActivationStage);

    /// Fires, before restoring state, for every activation in `(clean, dirty]`
    /// being undone by a rollback, walked in reverse frame order.
    fn on_roll_activation_change_back(&mut self, record: ActivationRecord);

    /// Fires once per tick when the scheduler returns `StarvedForInput`.
    fn on_starved_for_input_frame(&mut self, _frame: FrameIndex) {}

    /// Fires once per tick when the scheduler returns `StallAdvantage`.
    fn on_stall_advantage_frame(&mut self, _frame: FrameIndex) {}

    /// Fires once per tick when the scheduler returns `StayCurrent`.
    fn on_stay_current_frame(&mut self, _frame: FrameIndex) {}

    /// Fires once per tick when the scheduler returns `ToNext`.
    fn on_to_next_frame(&mut self, _frame: FrameIndex) {}

    /// Drops all internal state; called by `force_reset_and_cleanup`.
    fn reset_and_cleanup(&mut self) {}
}

/// Drives the input store for one player: polls local input, or accepts
/// whatever the System decoded from a remote packet.
pub trait InputEmulator: Rollbackable {
    /// The player this emulator drives.
    fn owner(&self) -> PlayerIdentity;

    /// Called exactly once per frame for local emulators to read local
    /// hardware/input-source state.
    fn on_poll_local_inputs(&mut self) -> InputTokenSet;

    /// Called when a packet boundary is crossed for a local emulator; the
    /// encoded bytes are ready to hand to the transport.
    fn on_ready_to_upload(&mut self, packet: Vec<u8>);
}

/// Serializes/deserializes user state for one entity.
pub trait StateSerializer: Rollbackable {
    /// Produces a byte-for-byte deterministic snapshot of this entity's
    /// state at the current frame.
    fn on_serialize(&mut self) -> Vec<u8>;

    /// Restores state from a snapshot previously produced by `on_serialize`.
    /// Must be idempotent.
    fn on_deserialize(&mut self, bytes: &[u8]);
}

/// Advances user state by one frame, and optionally by sub-frame ticks.
pub trait Simulator: Rollbackable {
    /// Advances state by exactly one frame given every active player's
    /// input for that frame.
    fn on_simulate_frame(&mut self, frame: FrameIndex, inputs: &BTreeMap<PlayerIdentity, InputTokenSet>);

    /// Fires once per simulated or re-simulated frame, after
    /// `on_simulate_frame` and before `on_serialize`, with the fixed frame
    /// duration rather than a wall-clock delta — re-simulation replays the
    /// identical sequence of calls as first simulation, so any state it
    /// touches is captured by the following snapshot.
    fn on_simulate_tick(&mut self, _delta: Fixed) {}
}

/// A registered component, tagged by which capability trait it implements.
///
/// Held in a single `Vec` per System so iteration order (registration order)
/// is deterministic across rollbacks, per the Rollbackable registry's
/// ordering contract.
pub enum RollbackableComponent {
    /// Drives one player's inputs.
    InputEmulator(Box<dyn InputEmulator + Send>),
    /// Serializes/deserializes one entity's state.
    StateSerializer(Box<dyn StateSerializer + Send>),
    /// Advances one entity's state.
    Simulator(Box<dyn Simulator + Send>),
}

impl RollbackableComponent {
    /// Borrows the shared [`Rollbackable`] lifecycle surface regardless of
    /// which concrete kind this is.
    pub fn as_rollbackable_mut(&mut self) -> &mut dyn Rollbackable {
        match self {
            RollbackableComponent::InputEmulator(c) => c.as_mut(),
            RollbackableComponent::StateSerializer(c) => c.as_mut(),
            RollbackableComponent::Simulator(c) => c.as_mut(),
        }
    }
}
