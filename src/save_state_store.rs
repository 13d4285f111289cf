//! Save-state store: one ring per entity, holding the most recent
//! `rollback + 1` serialized snapshots produced by [`crate::rollbackable::StateSerializer::on_serialize`].
//!
//! A zero checksum is never produced by [`crate::checksum::compute_checksum`],
//! so this store reserves `0` to mean "no snapshot recorded at this frame" —
//! [`SaveStateStore::checksum_at`] returns it for any frame outside the
//! window or never saved.

use crate::checksum::compute_checksum;
use crate::ids::FrameIndex;

/// Sentinel returned by [`SaveStateStore::checksum_at`] for a frame with no
/// recorded snapshot.
pub const NO_SNAPSHOT_CHECKSUM: u16 = 0;

#[derive(Debug, Clone, Default)]
struct Slot {
    frame: Option<FrameIndex>,
    bytes: Vec<u8>,
    checksum: u16,
}

/// A single stored snapshot: the frame it was taken at, its serialized bytes,
/// and the checksum computed over them.
#[derive(Debug, Clone, Copy)]
pub struct SaveStateRef<'a> {
    /// The frame this snapshot was taken at.
    pub frame: FrameIndex,
    /// The serialized bytes produced by `on_serialize`.
    pub bytes: &'a [u8],
    /// The checksum computed over `bytes` at save time.
    pub checksum: u16,
}

impl SaveStateRef<'_> {
    /// The length in bytes of the stored snapshot.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }
}

/// Per-(System, Entity) ring of `{frame, bytes, checksum}` snapshots, sized
/// `rollback + 1` per [`crate::config::Configuration::save_state_ring_capacity`].
#[derive(Debug)]
pub struct SaveStateStore {
    slots: Vec<Slot>,
}

impl SaveStateStore {
    /// Builds an empty store sized for the given rollback window.
    #[must_use]
    pub fn new(rollback_window: u16) -> Self {
        Self {
            slots: vec![Slot::default(); usize::from(rollback_window) + 1],
        }
    }

    fn index_of(&self, frame: FrameIndex) -> usize {
        usize::from(frame.as_u16()) % self.slots.len()
    }

    /// Records a snapshot for `frame`, computing and returning its checksum.
    pub fn save(&mut self, frame: FrameIndex, bytes: Vec<u8>) -> u16 {
        let checksum = compute_checksum(&bytes);
        let idx = self.index_of(frame);
        self.slots[idx] = Slot {
            frame: Some(frame),
            bytes,
            checksum,
        };
        checksum
    }

    /// The snapshot recorded for `frame`, if the ring still holds it.
    #[must_use]
    pub fn get(&self, frame: FrameIndex) -> Option<SaveStateRef<'_>> {
        let idx = self.index_of(frame);
        let slot = &self.slots[idx];
        (slot.frame == Some(frame)).then(|| SaveStateRef {
            frame,
            bytes: slot.bytes.as_slice(),
            checksum: slot.checksum,
        })
    }

    /// The checksum recorded for `frame`, or [`NO_SNAPSHOT_CHECKSUM`] if none.
    #[must_use]
    pub fn checksum_at(&self, frame: FrameIndex) -> u16 {
        self.get(frame).map_or(NO_SNAPSHOT_CHECKSUM, |snapshot| snapshot.checksum)
    }

    /// Drops every recorded snapshot.
    pub fn reset(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = Slot::default());
    }
}
