//! Error types for the rollback-synchronization engine.
//!
//! Every variant is structured: numeric context is stored directly on the
//! enum rather than formatted into a string, so constructing and matching on
//! an error never allocates and callers can recover the exact frame/window
//! involved. This mirrors the "structured variant" half of the error design
//! used across this codebase's ecosystem — without the legacy string-typed
//! twin, since this crate has no pre-existing stringly-typed API surface to
//! stay backward compatible with.

use std::fmt;
use std::ops::RangeInclusive;

use crate::ids::{FrameIndex, PlayerIdentity};

/// Crate-wide result alias.
pub type RollbackResult<T> = Result<T, RollbackError>;

/// Every recoverable or fatal condition the engine can report.
///
/// `#[non_exhaustive]` so new variants can be added without a semver break.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RollbackError {
    /// A frame index lies outside the sliding window a call required it to
    /// be in. Expected during normal out-of-order packet arrival.
    OutOfWindow {
        /// The frame that was rejected.
        frame: FrameIndex,
        /// The window it was required to fall within, inclusive.
        window: RangeInclusive<FrameIndex>,
    },
    /// A packet failed to decode.
    Malformed(MalformedPacketReason),
    /// `change_activation_in_past` targeted a frame older than the rollback
    /// window.
    UnreachablePastFrame {
        /// The requested activation frame.
        requested: FrameIndex,
        /// The oldest frame still inside the window.
        oldest_reachable: FrameIndex,
    },
    /// The rollback controller could not find a clean anchor frame inside
    /// the window. Fatal: the System must be reset.
    UnrecoverableDivergence {
        /// The dirty frame that triggered the search.
        dirty_frame: FrameIndex,
        /// The oldest frame that was searched.
        window_start: FrameIndex,
    },
    /// The tick scheduler was invoked with no registered `InputEmulator`.
    /// Always a programmer error.
    NoActiveEmulator,
    /// A component activation record violated the strictly-alternating
    /// Activate/Deactivate invariant for its owner.
    NonAlternatingActivation {
        /// The player identity whose activation timeline was violated.
        owner: PlayerIdentity,
        /// The frame of the offending record.
        frame: FrameIndex,
    },
    /// [`crate::config::Configuration::validate`] rejected a self-contradictory
    /// `Configuration`.
    InvalidConfiguration {
        /// What was wrong with the configuration.
        reason: &'static str,
    },
}

impl fmt::Display for RollbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RollbackError::OutOfWindow { frame, window } => write!(
                f,
                "frame {frame} is outside the allowed window [{}, {}]",
                window.start(),
                window.end()
            ),
            RollbackError::Malformed(reason) => write!(f, "malformed packet: {reason}"),
            RollbackError::UnreachablePastFrame {
                requested,
                oldest_reachable,
            } => write!(
                f,
                "activation at frame {requested} is unreachable; oldest reachable frame is {oldest_reachable}"
            ),
            RollbackError::UnrecoverableDivergence {
                dirty_frame,
                window_start,
            } => write!(
                f,
                "no clean anchor found for dirty frame {dirty_frame} within window starting at {window_start}"
            ),
            RollbackError::NoActiveEmulator => {
                write!(f, "tick scheduler invoked with no active InputEmulator registered")
            }
            RollbackError::NonAlternatingActivation { owner, frame } => write!(
                f,
                "activation record at frame {frame} breaks the alternating Activate/Deactivate sequence for {owner}"
            ),
            RollbackError::InvalidConfiguration { reason } => write!(f, "invalid configuration: {reason}"),
        }
    }
}

impl std::error::Error for RollbackError {}

/// Why [`crate::packet::decode_packet`] rejected a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedPacketReason {
    /// The buffer is shorter than the 8-byte header.
    TruncatedHeader,
    /// The header claims zero frames.
    EmptyFrameCount,
    /// The body ended before completing the last frame-block.
    TruncatedBody,
    /// A decoded token exceeded the valid `0..=127` domain.
    TokenOutOfRange {
        /// The offending byte, header bit included.
        byte: u8,
    },
}

impl fmt::Display for MalformedPacketReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedPacketReason::TruncatedHeader => write!(f, "buffer shorter than the 8-byte header"),
            MalformedPacketReason::EmptyFrameCount => write!(f, "header claims frame_count = 0"),
            MalformedPacketReason::TruncatedBody => write!(f, "body exhausted mid-frame"),
            MalformedPacketReason::TokenOutOfRange { byte } => {
                write!(f, "token byte {byte:#04x} decodes to a value > 127")
            }
        }
    }
}

/// Classifier returned by `OnRegisterActivationChange` at registration time.
///
/// Distinct from [`RollbackError`]: registration itself never fails in a way
/// that needs the full error type, it just classifies *when* the activation
/// will take effect (or that it can't).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationRegisterOutcome {
    /// The record was queued and will take effect at its scheduled frame.
    Registered,
    /// The record targets a frame before the System has been synced to a
    /// start frame.
    PreStart,
    /// The record targets a past frame outside the rollback window.
    UnreachablePastFrame,
}

/// Result of [`crate::input_store::FrameInputStore::apply_remote_packet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyPacketOutcome {
    /// The packet was applied; no prior inputs changed.
    Success,
    /// The packet was applied and flipped the value of one or more
    /// previously-predicted or previously-confirmed slots, marking them
    /// dirty for the rollback controller.
    SuccessDirty {
        /// The oldest frame whose slot changed value.
        oldest_dirty: FrameIndex,
    },
    /// The packet's anchor frame was not newer than the anchor frame already
    /// on file; discarded whole.
    Stale,
    /// None of the packet's frames fell inside the store's current window.
    OutOfWindow,
}

/// Result of [`crate::system::System::download_remote_player_binary`].
pub type DownloadResult = RollbackResult<ApplyPacketOutcome>;

/// Result of [`crate::system::System::upload_inputs_from_remote_start_frame_index`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Packets were produced for upload.
    Success(Vec<Vec<u8>>),
    /// The requested start frame is not yet covered by local input history.
    NotReady,
}
