//! The activation/deactivation protocol: register, queue, and replay
//! component activation changes, including the rollback-aware undo path.
//!
//! Modeled per the design note: "the activation log [is] an insert-ordered
//! per-frame queue inside the rollback anchor; on rollback, walk queues in
//! reverse before restoring state." [`ActivationLog`] keeps one
//! insertion-ordered list per owner and answers range/per-frame queries by
//! linear scan, which is cheap at rollback-window scale (tens of entries).

use crate::error::ActivationRegisterOutcome;
use crate::ids::{FrameIndex, PlayerIdentity};
use crate::rollbackable::{ActivationKind, ActivationRecord};

/// Insertion-ordered log of every activation record registered for a System,
/// plus the bookkeeping needed to validate the per-owner alternating
/// Activate/Deactivate invariant.
#[derive(Debug, Default)]
pub struct ActivationLog {
    records: Vec<ActivationRecord>,
}

impl ActivationLog {
    /// An empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a `ChangeActivationNow` request, effective at
    /// `current_frame + delay_frames_count + 1` so predictions over the
    /// delay window remain valid.
    pub fn change_activation_now(
        &mut self,
        owner: PlayerIdentity,
        kind: ActivationKind,
        current_frame: FrameIndex,
        delay_frames_count: u16,
    ) -> ActivationRegisterOutcome {
        let effective = current_frame.wrapping_add(delay_frames_count + 1);
        self.push(ActivationRecord {
            owner,
            kind,
            frame: effective,
        });
        ActivationRegisterOutcome::Registered
    }

    /// Registers a `ChangeActivationInPast` request. `record.frame` must lie
    /// in `[current_frame - rollback_window, current_frame]`.
    pub fn change_activation_in_past(
        &mut self,
        record: ActivationRecord,
        current_frame: FrameIndex,
        rollback_window: u16,
    ) -> ActivationRegisterOutcome {
        let oldest_reachable = current_frame.wrapping_sub(rollback_window);
        if !record.frame.in_window(oldest_reachable, current_frame) {
            return ActivationRegisterOutcome::UnreachablePastFrame;
        }
        self.push(record);
        ActivationRegisterOutcome::Registered
    }

    fn push(&mut self, record: ActivationRecord) {
        self.records.push(record);
    }

    /// `true` if every owner's recorded timeline strictly alternates
    /// Activate/Deactivate with monotonically increasing frames (invariant
    /// 4). Intended for test/debug assertions, not the hot path.
    #[must_use]
    pub fn timelines_are_valid(&self) -> bool {
        let mut owners: Vec<PlayerIdentity> = self.records.iter().map(|r| r.owner).collect();
        owners.sort_by_key(|o| o.id);
        owners.dedup();

        for owner in owners {
            let mut timeline: Vec<&ActivationRecord> = self.records.iter().filter(|r| r.owner == owner).collect();
            timeline.sort_by_key(|r| r.frame.as_u16());
            let mut expected = ActivationKind::Activate;
            let mut last_frame: Option<FrameIndex> = None;
            for record in timeline {
                if record.kind != expected {
                    return false;
                }
                if let Some(last) = last_frame {
                    if record.frame.distance_from(last) <= 0 {
                        return false;
                    }
                }
                last_frame = Some(record.frame);
                expected = match expected {
                    ActivationKind::Activate => ActivationKind::Deactivate,
                    ActivationKind::Deactivate => ActivationKind::Activate,
                };
            }
        }
        true
    }

    /// Records scheduled exactly at `frame`, in registration order — used to
    /// fire `OnActivationChange` while simulating/re-simulating that frame.
    pub fn at_frame(&self, frame: FrameIndex) -> impl Iterator<Item = &ActivationRecord> {
        self.records.iter().filter(move |r| r.frame == frame)
    }

    /// Records with `frame` in `(clean, dirty]`, in reverse registration
    /// order — used to fire `OnRollActivationChangeBack` before restoring
    /// state at `clean`.
    pub fn in_range_reverse(&self, clean: FrameIndex, dirty: FrameIndex) -> Vec<&ActivationRecord> {
        let mut hits: Vec<&ActivationRecord> = self
            .records
            .iter()
            .filter(|r| r.frame.distance_from(clean) > 0 && r.frame.distance_from(dirty) <= 0)
            .collect();
        hits.reverse();
        hits
    }

    /// Drops every record older than `oldest_reachable`, keeping the log
    /// bounded to the rollback window.
    pub fn prune_before(&mut self, oldest_reachable: FrameIndex) {
        self.records.retain(|r| r.frame.distance_from(oldest_reachable) >= 0);
    }
}
