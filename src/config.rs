//! Immutable per-run [`Configuration`] for a [`crate::system::System`].
//!
//! # Forward Compatibility
//!
//! New fields may be added to this struct in future versions. To ensure your
//! code continues to compile, always use `..Configuration::default()` (or one
//! of the presets below) when constructing instances rather than naming every
//! field.

use web_time::Duration;

use crate::error::{RollbackError, RollbackResult};
use crate::fixed::Fixed;

/// Immutable tuning knobs for one [`crate::system::System`].
///
/// Construct with [`Configuration::builder`], a preset (e.g.
/// [`Configuration::lan`]), or `Configuration { ..Configuration::default() }`.
/// Always call [`Configuration::validate`] before handing a `Configuration`
/// to `System::new` — the constructors here never fail, so a
/// hand-built struct can still be self-contradictory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "Configuration has no effect unless passed to System::new"]
pub struct Configuration {
    /// Target wall-clock duration of one simulation frame.
    ///
    /// Default: 16667µs (60Hz).
    pub frame_duration: FixedDuration,
    /// Number of most-recent frames whose state is kept restorable. Must be
    /// `>= 1`.
    ///
    /// Default: 8.
    pub min_rollback_frame_count: u16,
    /// Number of future frames whose local input slots are pre-allocated.
    ///
    /// Default: 2.
    pub delay_frames_count: u16,
    /// Extra grace frames beyond `delay_frames_count` before a missing
    /// remote input is treated as starvation rather than prediction.
    ///
    /// Default: 1.
    pub input_leniency_frames_count: u16,
    /// Frame-advantage threshold over a remote peer above which the
    /// scheduler considers `StallAdvantage` rather than advancing.
    ///
    /// Default: 4.
    pub stall_threshold_frames: u16,
    /// Wall-clock budget a `StallAdvantage` condition may persist before the
    /// scheduler falls through to checking starvation instead.
    ///
    /// Default: 1s.
    pub stall_timer_duration: FixedDuration,
    /// Wall-clock budget a missing next-frame remote input may persist
    /// before the scheduler falls through past `StarvedForInput`.
    ///
    /// Default: 1s.
    pub starvation_timer_duration: FixedDuration,
    /// Wall-clock budget a `DoubleSimulation` opportunity's grace timer runs
    /// for before double-simulation is forced off for the remainder of the
    /// episode.
    ///
    /// Default: 1s.
    pub double_simulation_timer_duration: FixedDuration,
    /// Whether the scheduler is allowed to return `DoubleSimulation` at all.
    ///
    /// Default: `true`.
    pub allow_double_simulation: bool,
    /// When `true`, always rolls back the full `min_rollback_frame_count`
    /// window each time the oldest remote checksum is newly received,
    /// trading CPU for more uniform latency.
    ///
    /// Default: `false`.
    pub forced_max_rollback: bool,
}

/// A `Fixed`-point duration with a `Duration`-typed constructor, so
/// `Configuration` literals read naturally while the field itself stays in
/// the deterministic fixed-point domain.
pub type FixedDuration = Fixed;

impl Default for Configuration {
    fn default() -> Self {
        Self {
            frame_duration: Fixed::from_micros(16_667),
            min_rollback_frame_count: 8,
            delay_frames_count: 2,
            input_leniency_frames_count: 1,
            stall_threshold_frames: 4,
            stall_timer_duration: Fixed::from_duration(Duration::from_secs(1)),
            starvation_timer_duration: Fixed::from_duration(Duration::from_secs(1)),
            double_simulation_timer_duration: Fixed::from_duration(Duration::from_secs(1)),
            allow_double_simulation: true,
            forced_max_rollback: false,
        }
    }
}

impl Configuration {
    /// Creates a new `Configuration` with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry point for incremental construction via `..Configuration::default()`.
    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::default()
    }

    /// Preset tuned for same-subnet LAN play: tight rollback window, no
    /// delay frames needed, aggressive timers.
    pub fn lan() -> Self {
        Self {
            frame_duration: Fixed::from_micros(16_667),
            min_rollback_frame_count: 4,
            delay_frames_count: 0,
            input_leniency_frames_count: 1,
            stall_threshold_frames: 4,
            stall_timer_duration: Fixed::from_duration(Duration::from_millis(250)),
            starvation_timer_duration: Fixed::from_duration(Duration::from_millis(250)),
            double_simulation_timer_duration: Fixed::from_duration(Duration::from_millis(250)),
            allow_double_simulation: true,
            forced_max_rollback: false,
        }
    }

    /// Preset tuned for internet play across a typical WAN (50-150ms RTT):
    /// wider rollback window, one delay frame to absorb jitter.
    pub fn wan() -> Self {
        Self {
            frame_duration: Fixed::from_micros(16_667),
            min_rollback_frame_count: 8,
            delay_frames_count: 2,
            input_leniency_frames_count: 2,
            stall_threshold_frames: 6,
            stall_timer_duration: Fixed::from_duration(Duration::from_secs(1)),
            starvation_timer_duration: Fixed::from_duration(Duration::from_secs(1)),
            double_simulation_timer_duration: Fixed::from_duration(Duration::from_secs(1)),
            allow_double_simulation: true,
            forced_max_rollback: false,
        }
    }

    /// Preset tuned for high-latency/high-jitter mobile networks: widest
    /// rollback window, generous delay and leniency, double-simulation
    /// disabled since mobile CPUs rarely have the headroom to absorb it.
    pub fn mobile() -> Self {
        Self {
            frame_duration: Fixed::from_micros(16_667),
            min_rollback_frame_count: 12,
            delay_frames_count: 3,
            input_leniency_frames_count: 3,
            stall_threshold_frames: 10,
            stall_timer_duration: Fixed::from_duration(Duration::from_secs(2)),
            starvation_timer_duration: Fixed::from_duration(Duration::from_secs(2)),
            double_simulation_timer_duration: Fixed::from_duration(Duration::from_secs(2)),
            allow_double_simulation: false,
            forced_max_rollback: false,
        }
    }

    /// Total capacity required of the frame-indexed input store ring:
    /// `rollback + delay + 1`.
    #[must_use]
    pub const fn input_ring_capacity(self) -> usize {
        self.min_rollback_frame_count as usize + self.delay_frames_count as usize + 1
    }

    /// Total capacity required of the save-state store ring: `rollback + 1`.
    #[must_use]
    pub const fn save_state_ring_capacity(self) -> usize {
        self.min_rollback_frame_count as usize + 1
    }

    /// Validates internal consistency. Always call this before constructing
    /// a `System` from a hand-built `Configuration`.
    ///
    /// # Errors
    ///
    /// Returns [`RollbackError::InvalidConfiguration`] if `min_rollback_frame_count == 0`,
    /// if the ring capacities would overflow `u16::MAX` (the width of
    /// [`crate::ids::FrameIndex`]), or if a timer duration is negative.
    pub fn validate(&self) -> RollbackResult<()> {
        if self.min_rollback_frame_count == 0 {
            return Err(RollbackError::InvalidConfiguration {
                reason: "min_rollback_frame_count must be at least 1",
            });
        }
        if self.input_ring_capacity() >= usize::from(u16::MAX) {
            return Err(RollbackError::InvalidConfiguration {
                reason: "rollback + delay + 1 must not overflow u16::MAX",
            });
        }
        if !self.stall_timer_duration.is_non_negative()
            || !self.starvation_timer_duration.is_non_negative()
            || !self.double_simulation_timer_duration.is_non_negative()
        {
            return Err(RollbackError::InvalidConfiguration {
                reason: "timer durations must be non-negative",
            });
        }
        Ok(())
    }
}

/// Incremental builder for [`Configuration`], for call sites that want
/// `.with_x(...)` chaining instead of struct-update syntax.
#[derive(Debug, Clone, Copy, Default)]
#[must_use = "ConfigurationBuilder does nothing until .build() is called"]
pub struct ConfigurationBuilder {
    config: OptionalConfiguration,
}

#[derive(Debug, Clone, Copy, Default)]
struct OptionalConfiguration {
    frame_duration: Option<Fixed>,
    min_rollback_frame_count: Option<u16>,
    delay_frames_count: Option<u16>,
    input_leniency_frames_count: Option<u16>,
    stall_threshold_frames: Option<u16>,
    stall_timer_duration: Option<Fixed>,
    starvation_timer_duration: Option<Fixed>,
    double_simulation_timer_duration: Option<Fixed>,
    allow_double_simulation: Option<bool>,
    forced_max_rollback: Option<bool>,
}

impl ConfigurationBuilder {
    /// Sets the target frame duration.
    pub fn with_frame_duration(mut self, duration: Fixed) -> Self {
        self.config.frame_duration = Some(duration);
        self
    }

    /// Sets the rollback window size.
    pub fn with_min_rollback_frame_count(mut self, count: u16) -> Self {
        self.config.min_rollback_frame_count = Some(count);
        self
    }

    /// Sets the number of delay frames.
    pub fn with_delay_frames_count(mut self, count: u16) -> Self {
        self.config.delay_frames_count = Some(count);
        self
    }

    /// Sets the starvation leniency in frames.
    pub fn with_input_leniency_frames_count(mut self, count: u16) -> Self {
        self.config.input_leniency_frames_count = Some(count);
        self
    }

    /// Sets the frame-advantage threshold above which the scheduler
    /// considers `StallAdvantage`.
    pub fn with_stall_threshold_frames(mut self, frames: u16) -> Self {
        self.config.stall_threshold_frames = Some(frames);
        self
    }

    /// Sets the stall grace timer.
    pub fn with_stall_timer_duration(mut self, duration: Fixed) -> Self {
        self.config.stall_timer_duration = Some(duration);
        self
    }

    /// Sets the starvation grace timer.
    pub fn with_starvation_timer_duration(mut self, duration: Fixed) -> Self {
        self.config.starvation_timer_duration = Some(duration);
        self
    }

    /// Sets the double-simulation grace timer.
    pub fn with_double_simulation_timer_duration(mut self, duration: Fixed) -> Self {
        self.config.double_simulation_timer_duration = Some(duration);
        self
    }

    /// Sets whether double-simulation is allowed.
    pub fn with_allow_double_simulation(mut self, allow: bool) -> Self {
        self.config.allow_double_simulation = Some(allow);
        self
    }

    /// Sets whether forced-max-rollback policy is enabled.
    pub fn with_forced_max_rollback(mut self, forced: bool) -> Self {
        self.config.forced_max_rollback = Some(forced);
        self
    }

    /// Materializes a [`Configuration`], filling any unset field from
    /// [`Configuration::default`].
    pub fn build(self) -> Configuration {
        let defaults = Configuration::default();
        Configuration {
            frame_duration: self.config.frame_duration.unwrap_or(defaults.frame_duration),
            min_rollback_frame_count: self
                .config
                .min_rollback_frame_count
                .unwrap_or(defaults.min_rollback_frame_count),
            delay_frames_count: self.config.delay_frames_count.unwrap_or(defaults.delay_frames_count),
            input_leniency_frames_count: self
                .config
                .input_leniency_frames_count
                .unwrap_or(defaults.input_leniency_frames_count),
            stall_threshold_frames: self.config.stall_threshold_frames.unwrap_or(defaults.stall_threshold_frames),
            stall_timer_duration: self.config.stall_timer_duration.unwrap_or(defaults.stall_timer_duration),
            starvation_timer_duration: self
                .config
                .starvation_timer_duration
                .unwrap_or(defaults.starvation_timer_duration),
            double_simulation_timer_duration: self
                .config
                .double_simulation_timer_duration
                .unwrap_or(defaults.double_simulation_timer_duration),
            allow_double_simulation: self
                .config
                .allow_double_simulation
                .unwrap_or(defaults.allow_double_simulation),
            forced_max_rollback: self.config.forced_max_rollback.unwrap_or(defaults.forced_max_rollback),
        }
    }
}
