//! Convenient re-exports for common usage.
//!
//! ```rust
//! use riftlock_rollback::prelude::*;
//! ```

pub use crate::activation::ActivationLog;
pub use crate::config::{Configuration, ConfigurationBuilder};
pub use crate::error::{
    ActivationRegisterOutcome, ApplyPacketOutcome, DownloadResult, RollbackError, RollbackResult,
    UploadOutcome,
};
pub use crate::fixed::Fixed;
pub use crate::ids::{FrameIndex, PlayerIdentity, SystemIndex};
pub use crate::input_store::InputStatus;
pub use crate::multiton::{registry, Registry};
pub use crate::rollbackable::{
    ActivationKind, ActivationRecord, ActivationStage, InputEmulator, Rollbackable,
    RollbackableComponent, Simulator, StateSerializer,
};
pub use crate::scheduler::Outcome;
pub use crate::system::System;
pub use crate::token_set::InputTokenSet;
