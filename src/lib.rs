//! # Riftlock Rollback
//!
//! Riftlock Rollback is a fortified, verified P2P rollback-synchronization
//! engine core, written in 100% safe Rust: frame-indexed input and
//! save-state rings, a toggle-stream wire codec, checksum-driven divergence
//! detection, and a deterministic tick scheduler.
//!
//! User code implements the three [`rollbackable`] capability traits —
//! [`rollbackable::InputEmulator`], [`rollbackable::StateSerializer`],
//! [`rollbackable::Simulator`] — registers them with a [`system::System`],
//! and drives it by calling [`system::System::try_ticking_to_next_frame`]
//! once per host tick and [`system::System::download_remote_player_binary`]
//! whenever a packet arrives from a peer.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// Activation/deactivation protocol: scheduling and replaying component
/// lifecycle changes, including the rollback-aware undo path.
pub mod activation;
/// Non-cryptographic checksum used for desync detection.
pub mod checksum;
/// Per-`System` tuning knobs and presets.
pub mod config;
/// Error types for the rollback-synchronization engine.
pub mod error;
/// Deterministic 32.32 fixed-point scalar.
pub mod fixed;
/// Identity and frame-indexing primitives.
pub mod ids;
/// Frame-indexed input store.
pub mod input_store;
/// Process-wide `SystemIndex` → `System` registry.
pub mod multiton;
/// Input packet wire codec.
pub mod packet;
/// Convenient re-exports for common usage.
pub mod prelude;
/// Rollback controller: state machine and anchor selection.
pub mod rollback;
/// The three component kinds user code registers with a `System`.
pub mod rollbackable;
/// Save-state store.
pub mod save_state_store;
/// The tick scheduler.
pub mod scheduler;
/// The top-level `System` facade.
pub mod system;
/// Shared test configuration and utilities for property-based testing.
#[doc(hidden)]
pub mod test_config;
/// Frame-indexed bitset of input tokens.
pub mod token_set;

pub use config::Configuration;
pub use error::{ApplyPacketOutcome, DownloadResult, RollbackError, RollbackResult, UploadOutcome};
pub use fixed::Fixed;
pub use ids::{FrameIndex, PlayerIdentity, SystemIndex};
pub use input_store::InputStatus;
pub use multiton::{registry, Registry};
pub use rollbackable::{ActivationKind, ActivationRecord, ActivationStage, RollbackableComponent};
pub use scheduler::Outcome;
pub use system::System;
pub use token_set::InputTokenSet;
