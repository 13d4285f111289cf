//! [`System`]: the top-level facade that composes configuration, the input
//! and save-state stores, the activation log, the rollback controller, and
//! the tick scheduler behind the inbound call surface described in
//! `DESIGN.md`.
//!
//! A `System` owns every [`RollbackableComponent`] registered with it and
//! dispatches lifecycle callbacks in deterministic registration order, so two
//! `System`s fed the same inputs in the same order reach bit-identical
//! states — the property the whole crate exists to protect.

use std::collections::BTreeMap;

use crate::activation::ActivationLog;
use crate::checksum::compute_checksum as digest;
use crate::config::Configuration;
use crate::error::{ApplyPacketOutcome, DownloadResult, RollbackError, RollbackResult, UploadOutcome};
use crate::fixed::Fixed;
use crate::ids::{FrameIndex, PlayerIdentity, SystemIndex};
use crate::input_store::{FrameInputStore, InputStatus};
use crate::packet::{decode_packet, encode_packet};
use crate::rollback::RollbackController;
use crate::rollbackable::{
    ActivationKind, ActivationRecord, ActivationStage, InputEmulator, Rollbackable, RollbackableComponent, Simulator,
    StateSerializer,
};
use crate::save_state_store::{SaveStateStore, NO_SNAPSHOT_CHECKSUM};
use crate::scheduler::{Outcome, TickScheduler};
use crate::token_set::InputTokenSet;

/// Index into a [`System`]'s component registry, returned by
/// [`System::register_component`].
pub type ComponentHandle = usize;

enum ComponentKind {
    InputEmulator {
        component: Box<dyn InputEmulator + Send>,
        store: FrameInputStore,
    },
    StateSerializer {
        component: Box<dyn StateSerializer + Send>,
        store: SaveStateStore,
    },
    Simulator {
        component: Box<dyn Simulator + Send>,
    },
}

impl ComponentKind {
    fn as_rollbackable_mut(&mut self) -> &mut dyn Rollbackable {
        match self {
            ComponentKind::InputEmulator { component, .. } => component.as_mut(),
            ComponentKind::StateSerializer { component, .. } => component.as_mut(),
            ComponentKind::Simulator { component } => component.as_mut(),
        }
    }
}

struct ComponentEntry {
    owner: PlayerIdentity,
    active: bool,
    kind: ComponentKind,
}

impl ComponentEntry {
    fn as_rollbackable_mut(&mut self) -> &mut dyn Rollbackable {
        self.kind.as_rollbackable_mut()
    }
}

/// One per-host rollback-synchronization engine.
///
/// Construct with [`System::new`], register every [`RollbackableComponent`]
/// the simulation needs, then call [`System::sync_with_remote_frame_index`]
/// once before the first [`System::try_ticking_to_next_frame`].
pub struct System {
    index: SystemIndex,
    config: Configuration,
    current_frame: Option<FrameIndex>,
    components: Vec<ComponentEntry>,
    activation_log: ActivationLog,
    scheduler: TickScheduler,
    rollback: RollbackController,
    remote_checksum_reports: BTreeMap<u16, (FrameIndex, u16)>,
    terminal_error: bool,
    pending_reactivation: Option<FrameIndex>,
}

impl System {
    /// Builds a new, unsynced `System`.
    ///
    /// # Errors
    ///
    /// Propagates [`Configuration::validate`].
    pub fn new(index: SystemIndex, config: Configuration) -> RollbackResult<Self> {
        config.validate()?;
        Ok(Self {
            index,
            config,
            current_frame: None,
            components: Vec::new(),
            activation_log: ActivationLog::new(),
            scheduler: TickScheduler::new(),
            rollback: RollbackController::new(),
            remote_checksum_reports: BTreeMap::new(),
            terminal_error: false,
            pending_reactivation: None,
        })
    }

    /// This System's index.
    #[must_use]
    pub fn index(&self) -> SystemIndex {
        self.index
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> Configuration {
        self.config
    }

    /// The current simulated frame, or `None` before the first sync.
    #[must_use]
    pub fn current_frame(&self) -> Option<FrameIndex> {
        self.current_frame
    }

    /// `true` once an [`crate::error::RollbackError::UnrecoverableDivergence`]
    /// has put this System in a terminal state. Only [`System::force_reset_and_cleanup`]
    /// clears it.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.terminal_error
    }

    /// Registers a component, owned by `owner`, allocating whatever
    /// per-player or per-entity store its kind requires.
    pub fn register_component(&mut self, owner: PlayerIdentity, component: RollbackableComponent) -> ComponentHandle {
        let kind = match component {
            RollbackableComponent::InputEmulator(component) => ComponentKind::InputEmulator {
                component,
                store: FrameInputStore::new(
                    self.config.min_rollback_frame_count,
                    self.config.delay_frames_count,
                    self.config.input_leniency_frames_count,
                    self.current_frame.unwrap_or(FrameIndex::ZERO),
                ),
            },
            RollbackableComponent::StateSerializer(component) => ComponentKind::StateSerializer {
                component,
                store: SaveStateStore::new(self.config.min_rollback_frame_count),
            },
            RollbackableComponent::Simulator(component) => ComponentKind::Simulator { component },
        };
        self.components.push(ComponentEntry { owner, active: true, kind });
        self.components.len() - 1
    }

    /// Synchronizes this System to `frame`, resetting the tick accumulator
    /// and every input store's notion of "current". Call once before the
    /// first tick, and again after `force_reset_and_cleanup`.
    pub fn sync_with_remote_frame_index(&mut self, frame: FrameIndex) {
        self.current_frame = Some(frame);
        self.scheduler.reset();
        self.terminal_error = false;
        self.pending_reactivation = None;
        for entry in &mut self.components {
            if let ComponentKind::InputEmulator { store, .. } = &mut entry.kind {
                store.resync(frame);
            }
        }
        let window_start = frame.wrapping_sub(self.config.min_rollback_frame_count);
        self.activation_log.prune_before(window_start);
        tracing::debug!(system = %self.index, frame = %frame, "synced to remote frame index");
    }

    /// Registers a `ChangeActivationNow` request, effective after the delay
    /// window per [`crate::activation::ActivationLog::change_activation_now`].
    pub fn change_activation_now(&mut self, owner: PlayerIdentity, kind: ActivationKind) -> crate::error::ActivationRegisterOutcome {
        let Some(current) = self.current_frame else {
            return crate::error::ActivationRegisterOutcome::PreStart;
        };
        self.activation_log
            .change_activation_now(owner, kind, current, self.config.delay_frames_count)
    }

    /// Registers a `ChangeActivationInPast` request, validated against the
    /// rollback window. If accepted and `record.frame` lies strictly before
    /// the current frame, the next [`System::try_ticking_to_next_frame`]
    /// call rolls back to re-simulate through it before advancing.
    pub fn change_activation_in_past(&mut self, record: ActivationRecord) -> crate::error::ActivationRegisterOutcome {
        let Some(current) = self.current_frame else {
            return crate::error::ActivationRegisterOutcome::PreStart;
        };
        let outcome = self
            .activation_log
            .change_activation_in_past(record, current, self.config.min_rollback_frame_count);
        if outcome == crate::error::ActivationRegisterOutcome::Registered && record.frame.distance_from(current) < 0 {
            self.pending_reactivation = Some(match self.pending_reactivation {
                Some(existing) if existing.distance_from(record.frame) <= 0 => existing,
                _ => record.frame,
            });
        }
        outcome
    }

    /// Decodes and applies a remote player's input packet, triggering a
    /// rollback in-line if it disagrees with already-simulated state.
    ///
    /// # Errors
    ///
    /// Propagates [`RollbackError::Malformed`] from decoding and
    /// [`RollbackError::UnrecoverableDivergence`] from the rollback it may
    /// trigger.
    pub fn download_remote_player_binary(&mut self, bytes: &[u8]) -> DownloadResult {
        let packet = decode_packet(bytes)?;

        let Some(entry_index) = self.components.iter().position(|entry| {
            !entry.owner.local && entry.owner.id == packet.player_id && matches!(entry.kind, ComponentKind::InputEmulator { .. })
        }) else {
            return Ok(ApplyPacketOutcome::OutOfWindow);
        };

        let outcome = {
            let ComponentKind::InputEmulator { store, .. } = &mut self.components[entry_index].kind else {
                unreachable!("entry_index was located by an InputEmulator match above")
            };
            store.apply_remote_packet(&packet)
        };

        if matches!(outcome, ApplyPacketOutcome::Stale | ApplyPacketOutcome::OutOfWindow) {
            return Ok(outcome);
        }

        self.remote_checksum_reports
            .insert(packet.player_id, (packet.anchor_frame, packet.anchor_checksum));

        let mut dirty_frame = match outcome {
            ApplyPacketOutcome::SuccessDirty { oldest_dirty } => Some(oldest_dirty),
            _ => None,
        };

        if let Some(current) = self.current_frame {
            if packet.anchor_frame.distance_from(current) <= 0 {
                let local_checksum = self.compute_checksum(packet.anchor_frame);
                if local_checksum != packet.anchor_checksum {
                    tracing::warn!(
                        system = %self.index,
                        frame = %packet.anchor_frame,
                        local_checksum,
                        remote_checksum = packet.anchor_checksum,
                        "checksum mismatch with remote anchor frame"
                    );
                    dirty_frame = Some(match dirty_frame {
                        Some(existing) if existing.distance_from(packet.anchor_frame) <= 0 => existing,
                        _ => packet.anchor_frame,
                    });
                }
            }

            if self.config.forced_max_rollback {
                let window_start = current.wrapping_sub(self.config.min_rollback_frame_count);
                self.rollback_to(window_start)?;
            } else if let Some(dirty) = dirty_frame {
                self.perform_rollback(dirty)?;
            }
        }

        Ok(outcome)
    }

    /// Encodes and returns every local player's packet covering
    /// `[from, current + delay]`, or [`UploadOutcome::NotReady`] if any local
    /// emulator's store doesn't yet cover that whole range without gaps.
    pub fn upload_inputs_from_remote_start_frame_index(&mut self, from: FrameIndex) -> UploadOutcome {
        if self.current_frame.is_none() {
            return UploadOutcome::NotReady;
        }

        struct Prepared {
            index: usize,
            bytes: Vec<u8>,
        }

        let current = self.current_frame.expect("checked above");
        let mut prepared = Vec::new();

        for (index, entry) in self.components.iter().enumerate() {
            let ComponentKind::InputEmulator { store, .. } = &entry.kind else {
                continue;
            };
            if !entry.owner.local {
                continue;
            }

            let (low, high) = store.window();
            if !from.in_window(low, high) {
                return UploadOutcome::NotReady;
            }
            let span = high.distance_from(from);
            if span < 0 {
                return UploadOutcome::NotReady;
            }

            let mut frames = Vec::with_capacity(usize::try_from(span + 1).unwrap_or(0));
            let mut frame = from;
            for _ in 0..=span {
                let (input, status) = store.get(frame);
                if status == InputStatus::Missing {
                    return UploadOutcome::NotReady;
                }
                frames.push(input);
                frame = frame.wrapping_add(1);
            }

            let checksum_frame = if high.distance_from(current) > 0 { current } else { high };
            let anchor_checksum = self.compute_checksum(checksum_frame);
            let bytes = encode_packet(entry.owner.id, high, anchor_checksum, &frames);
            prepared.push(Prepared { index, bytes });
        }

        if prepared.is_empty() {
            return UploadOutcome::NotReady;
        }

        let mut packets = Vec::with_capacity(prepared.len());
        for item in prepared {
            if let ComponentKind::InputEmulator { component, .. } = &mut self.components[item.index].kind {
                component.on_ready_to_upload(item.bytes.clone());
            }
            packets.push(item.bytes);
        }
        UploadOutcome::Success(packets)
    }

    /// Drops all registered components' internal state and this System's
    /// frame position; call [`System::sync_with_remote_frame_index`] again
    /// before reuse.
    pub fn force_reset_and_cleanup(&mut self) {
        for entry in &mut self.components {
            entry.as_rollbackable_mut().reset_and_cleanup();
            entry.active = true;
            match &mut entry.kind {
                ComponentKind::InputEmulator { store, .. } => store.reset(FrameIndex::ZERO),
                ComponentKind::StateSerializer { store, .. } => store.reset(),
                ComponentKind::Simulator { .. } => {}
            }
        }
        self.activation_log = ActivationLog::new();
        self.scheduler.reset();
        self.rollback.reset();
        self.remote_checksum_reports.clear();
        self.current_frame = None;
        self.terminal_error = false;
        self.pending_reactivation = None;
        tracing::info!(system = %self.index, "force reset and cleanup");
    }

    /// The combined checksum of every active entity's last recorded snapshot
    /// at `frame`: a Fletcher-16 digest over the concatenation of each
    /// [`StateSerializer`] entry's own per-entity checksum, in registration
    /// order, skipping entities with no snapshot at that frame.
    #[must_use]
    pub fn compute_checksum(&self, frame: FrameIndex) -> u16 {
        let mut combined = Vec::new();
        for entry in &self.components {
            if let ComponentKind::StateSerializer { store, .. } = &entry.kind {
                let checksum = store.checksum_at(frame);
                if checksum != NO_SNAPSHOT_CHECKSUM {
                    combined.extend_from_slice(&checksum.to_le_bytes());
                }
            }
        }
        digest(&combined)
    }

    /// Integrates `delta` and, per the scheduler's decision order, advances
    /// the simulation by zero, one, or two frames.
    pub fn try_ticking_to_next_frame(&mut self, delta: Fixed) -> Outcome {
        if self.terminal_error {
            return Outcome::UnrecoverableDivergence;
        }
        let Some(current) = self.current_frame else {
            return Outcome::NoActiveEmulator;
        };

        if let Some(target) = self.pending_reactivation.take() {
            if self.perform_rollback(target).is_err() {
                return Outcome::UnrecoverableDivergence;
            }
        }

        self.scheduler.integrate(delta);

        let has_active_emulator = self
            .components
            .iter()
            .any(|entry| entry.active && matches!(entry.kind, ComponentKind::InputEmulator { .. }));
        let frame_advantage = self.frame_advantage(current);
        let missing_next = self.any_required_remote_missing(current.wrapping_add(1));

        let outcome = self.scheduler.decide(
            self.config.frame_duration,
            has_active_emulator,
            frame_advantage,
            i32::from(self.config.stall_threshold_frames),
            self.config.stall_timer_duration,
            missing_next,
            self.config.starvation_timer_duration,
            self.config.allow_double_simulation,
            self.config.double_simulation_timer_duration,
        );

        match outcome {
            Outcome::ToNext => {
                let next = current.wrapping_add(1);
                self.simulate_one_frame(next, ActivationStage::FirstSimulation, true);
                self.current_frame = Some(next);
                self.resync_input_stores(next);
                self.fire_tick_hook(next, |r, f| r.on_to_next_frame(f));
            }
            Outcome::DoubleSimulation => {
                let mut frame = current;
                for _ in 0..2 {
                    frame = frame.wrapping_add(1);
                    self.simulate_one_frame(frame, ActivationStage::FirstSimulation, true);
                }
                self.current_frame = Some(frame);
                self.resync_input_stores(frame);
                self.fire_tick_hook(frame, |r, f| r.on_to_next_frame(f));
            }
            Outcome::StallAdvantage => self.fire_tick_hook(current, |r, f| r.on_stall_advantage_frame(f)),
            Outcome::StarvedForInput => self.fire_tick_hook(current, |r, f| r.on_starved_for_input_frame(f)),
            Outcome::StayCurrent => self.fire_tick_hook(current, |r, f| r.on_stay_current_frame(f)),
            Outcome::NoActiveEmulator | Outcome::UnrecoverableDivergence => {}
        }

        outcome
    }

    fn fire_tick_hook(&mut self, frame: FrameIndex, hook: impl Fn(&mut dyn Rollbackable, FrameIndex)) {
        for entry in &mut self.components {
            hook(entry.as_rollbackable_mut(), frame);
        }
    }

    /// Slides every input store's window to `frame`, the System's new
    /// current frame. Each store's own notion of "current" only otherwise
    /// moves on an explicit [`System::sync_with_remote_frame_index`], so this
    /// must run after every successful tick to keep `set_local`'s window and
    /// `get`'s prediction lag test anchored to the right place.
    fn resync_input_stores(&mut self, frame: FrameIndex) {
        for entry in &mut self.components {
            if let ComponentKind::InputEmulator { store, .. } = &mut entry.kind {
                store.resync(frame);
            }
        }
    }

    fn frame_advantage(&self, current: FrameIndex) -> i32 {
        let mut min_remote: Option<FrameIndex> = None;
        for entry in &self.components {
            if entry.owner.local {
                continue;
            }
            if let ComponentKind::InputEmulator { store, .. } = &entry.kind {
                let reported = store.last_confirmed_frame().unwrap_or(entry.owner.join_frame);
                min_remote = Some(match min_remote {
                    Some(existing) if reported.distance_from(existing) >= 0 => existing,
                    _ => reported,
                });
            }
        }
        min_remote.map_or(0, |reported| current.distance_from(reported))
    }

    fn any_required_remote_missing(&self, frame: FrameIndex) -> bool {
        self.components.iter().any(|entry| {
            if entry.owner.local || !entry.active {
                return false;
            }
            if let ComponentKind::InputEmulator { store, .. } = &entry.kind {
                store.get(frame).1 == InputStatus::Missing
            } else {
                false
            }
        })
    }

    fn collect_inputs_for_frame(&self, frame: FrameIndex) -> BTreeMap<PlayerIdentity, InputTokenSet> {
        let mut inputs = BTreeMap::new();
        for entry in &self.components {
            if !entry.active {
                continue;
            }
            if let ComponentKind::InputEmulator { store, .. } = &entry.kind {
                inputs.insert(entry.owner, store.get(frame).0);
            }
        }
        inputs
    }

    fn simulate_one_frame(&mut self, frame: FrameIndex, stage: ActivationStage, poll_local: bool) {
        let records: Vec<ActivationRecord> = self.activation_log.at_frame(frame).copied().collect();
        for record in &records {
            for entry in &mut self.components {
                if entry.owner == record.owner {
                    entry.active = matches!(record.kind, ActivationKind::Activate);
                    entry.as_rollbackable_mut().on_activation_change(*record, stage);
                }
            }
        }

        if poll_local {
            for entry in &mut self.components {
                if !entry.owner.local || !entry.active {
                    continue;
                }
                if let ComponentKind::InputEmulator { component, store } = &mut entry.kind {
                    let input = component.on_poll_local_inputs();
                    store.confirm_for_advance(frame, input);
                }
            }
        }

        let inputs = self.collect_inputs_for_frame(frame);

        for entry in &mut self.components {
            if !entry.active {
                continue;
            }
            if let ComponentKind::Simulator { component } = &mut entry.kind {
                component.on_simulate_frame(frame, &inputs);
            }
        }

        let frame_duration = self.config.frame_duration;
        for entry in &mut self.components {
            if !entry.active {
                continue;
            }
            if let ComponentKind::Simulator { component } = &mut entry.kind {
                component.on_simulate_tick(frame_duration);
            }
        }

        for entry in &mut self.components {
            if !entry.active {
                continue;
            }
            if let ComponentKind::StateSerializer { component, store } = &mut entry.kind {
                let bytes = component.on_serialize();
                store.save(frame, bytes);
            }
        }
    }

    /// Undoes activations back to `anchor`, restores every entity's state
    /// there, then re-simulates forward to the System's current frame.
    fn rollback_to(&mut self, anchor: FrameIndex) -> RollbackResult<()> {
        let Some(current) = self.current_frame else {
            return Ok(());
        };
        self.rollback.begin();
        tracing::warn!(system = %self.index, anchor = %anchor, current = %current, "rollback: restoring to anchor");

        let undo: Vec<ActivationRecord> = self.activation_log.in_range_reverse(anchor, current).into_iter().copied().collect();
        for record in &undo {
            for entry in &mut self.components {
                if entry.owner == record.owner {
                    entry.active = matches!(record.kind, ActivationKind::Deactivate);
                    entry.as_rollbackable_mut().on_roll_activation_change_back(*record);
                }
            }
        }

        for entry in &mut self.components {
            if let ComponentKind::StateSerializer { component, store } = &mut entry.kind {
                if let Some(snapshot) = store.get(anchor) {
                    component.on_deserialize(snapshot.bytes);
                }
            }
        }

        let mut frame = anchor;
        while frame.distance_from(current) < 0 {
            frame = frame.wrapping_add(1);
            self.simulate_one_frame(frame, ActivationStage::Resimulation, false);
        }

        self.rollback.finish(anchor);
        tracing::debug!(system = %self.index, anchor = %anchor, "rollback complete");
        Ok(())
    }

    fn perform_rollback(&mut self, dirty: FrameIndex) -> RollbackResult<()> {
        let Some(current) = self.current_frame else {
            return Ok(());
        };
        let window_start = current.wrapping_sub(self.config.min_rollback_frame_count);
        let components = &self.components;
        let anchor = RollbackController::select_anchor(dirty, window_start, |frame| frame_has_snapshot(components, frame));

        match anchor {
            Some(anchor) => self.rollback_to(anchor),
            None => {
                self.terminal_error = true;
                tracing::error!(system = %self.index, dirty = %dirty, window_start = %window_start, "unrecoverable divergence");
                Err(RollbackError::UnrecoverableDivergence { dirty_frame: dirty, window_start })
            }
        }
    }
}

fn frame_has_snapshot(components: &[ComponentEntry], frame: FrameIndex) -> bool {
    components
        .iter()
        .any(|entry| matches!(&entry.kind, ComponentKind::StateSerializer { store, .. } if store.get(frame).is_some()))
}
