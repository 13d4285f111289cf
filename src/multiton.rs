//! Process-wide [`SystemIndex`] → [`System`] registry.
//!
//! Most hosts run exactly one [`System`], but test harnesses and local
//! multi-instance setups (e.g. a headless referee process supervising
//! several matches) commonly want several, each reachable by a small
//! integer handle instead of threading a `&mut System` through every
//! callback. [`registry`] lazily spawns one global table behind a
//! [`parking_lot::Mutex`], following the `OnceLock`-backed singleton idiom
//! this codebase's ecosystem uses for process-wide handles.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use parking_lot::Mutex;

use crate::config::Configuration;
use crate::error::{RollbackError, RollbackResult};
use crate::ids::SystemIndex;
use crate::system::System;

/// The process-wide table of registered Systems.
pub struct Registry {
    systems: Mutex<BTreeMap<u8, System>>,
}

impl Registry {
    fn new() -> Self {
        Self {
            systems: Mutex::new(BTreeMap::new()),
        }
    }

    /// Constructs and registers a new `System` under `index`, replacing
    /// whatever was previously registered there.
    ///
    /// # Errors
    ///
    /// Propagates [`Configuration::validate`] via [`System::new`].
    pub fn create(&self, index: SystemIndex, config: Configuration) -> RollbackResult<()> {
        let system = System::new(index, config)?;
        self.systems.lock().insert(index.0, system);
        tracing::info!(system = %index, "registered system");
        Ok(())
    }

    /// Removes the `System` registered under `index`, if any.
    pub fn remove(&self, index: SystemIndex) {
        if self.systems.lock().remove(&index.0).is_some() {
            tracing::info!(system = %index, "removed system");
        }
    }

    /// Runs `f` against the `System` registered under `index`.
    ///
    /// # Errors
    ///
    /// Returns [`RollbackError::NoActiveEmulator`] if no `System` is
    /// registered under `index`. This reuses the closest existing error
    /// variant rather than adding a registry-specific one the rest of the
    /// crate never needs.
    pub fn with_system<T>(&self, index: SystemIndex, f: impl FnOnce(&mut System) -> T) -> RollbackResult<T> {
        let mut systems = self.systems.lock();
        let system = systems.get_mut(&index.0).ok_or(RollbackError::NoActiveEmulator)?;
        Ok(f(system))
    }

    /// `true` if a `System` is currently registered under `index`.
    #[must_use]
    pub fn contains(&self, index: SystemIndex) -> bool {
        self.systems.lock().contains_key(&index.0)
    }

    /// Number of currently registered Systems.
    #[must_use]
    pub fn len(&self) -> usize {
        self.systems.lock().len()
    }

    /// `true` if no `System` is currently registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.systems.lock().is_empty()
    }
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Returns the process-wide [`Registry`], initializing it on first access.
pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}
