//! The tick scheduler: integrates wall-clock deltas into a fixed-point
//! accumulator and decides, once per call, which [`Outcome`] `System` reports
//! back to the caller.
//!
//! # Decision order
//!
//! 1. `accumulator < frame_duration` → [`Outcome::StayCurrent`]; nothing else
//!    is evaluated.
//! 2. Frame advantage over the stall threshold, stall grace timer not yet
//!    expired → [`Outcome::StallAdvantage`].
//! 3. The next frame's required remote input is [`crate::input_store::InputStatus::Missing`],
//!    starvation grace timer not yet expired → [`Outcome::StarvedForInput`].
//! 4. `accumulator >= 2 * frame_duration`, double-simulation is allowed, and
//!    its own grace timer has not run out → [`Outcome::DoubleSimulation`],
//!    consuming two frame durations. Once that timer runs out,
//!    double-simulation is forced off for the rest of the episode.
//! 5. Otherwise → [`Outcome::ToNext`], consuming one frame duration.
//!
//! This fixes the priority order left open by the distilled protocol:
//! `StallAdvantage > StarvedForInput > DoubleSimulation`. A condition whose
//! grace timer has run out simply falls through to the next check rather
//! than forcing a distinct outcome — the caller's logging is expected to
//! escalate severity (stall → starved) based on how long the condition has
//! persisted, not the scheduler's return value.

use crate::fixed::Fixed;

/// What the caller of [`TickScheduler::decide`] should do this call.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Advance the simulation by exactly one frame.
    ToNext,
    /// The accumulator has not reached a full frame duration yet; do not
    /// advance.
    StayCurrent,
    /// Advance by two frames in one call, to burn down accumulated lag.
    DoubleSimulation,
    /// A remote peer is far enough behind that advancing would widen the gap
    /// uselessly; hold at the current frame.
    StallAdvantage,
    /// The next frame's remote input is missing past the configured grace
    /// period.
    StarvedForInput,
    /// No registered `InputEmulator` is active; there is nothing to drive
    /// the simulation.
    NoActiveEmulator,
    /// The rollback controller could not find a clean anchor; the System is
    /// in a terminal error state and must be reset.
    UnrecoverableDivergence,
}

/// Per-System tick state: the fixed-point accumulator and the grace timers
/// for stall/starvation conditions.
#[derive(Debug, Default)]
pub struct TickScheduler {
    tick_accumulator: Fixed,
    stall_elapsed: Fixed,
    starve_elapsed: Fixed,
    double_sim_elapsed: Fixed,
    double_sim_forced_off: bool,
}

impl TickScheduler {
    /// A fresh scheduler with a zeroed accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The current accumulator value, for diagnostics/tests.
    #[must_use]
    pub fn tick_accumulator(&self) -> Fixed {
        self.tick_accumulator
    }

    /// Integrates a wall-clock delta into the accumulator.
    pub fn integrate(&mut self, delta: Fixed) {
        self.tick_accumulator += delta;
    }

    /// Runs the decision order above, consuming accumulator time for
    /// `ToNext`/`DoubleSimulation` outcomes and updating the grace timers.
    #[allow(clippy::too_many_arguments)]
    pub fn decide(
        &mut self,
        frame_duration: Fixed,
        has_active_emulator: bool,
        frame_advantage: i32,
        stall_threshold_frames: i32,
        stall_timer_duration: Fixed,
        next_frame_input_missing: bool,
        starvation_timer_duration: Fixed,
        allow_double_simulation: bool,
        double_simulation_timer_duration: Fixed,
    ) -> Outcome {
        if !has_active_emulator {
            return Outcome::NoActiveEmulator;
        }
        if self.tick_accumulator < frame_duration {
            return Outcome::StayCurrent;
        }

        if frame_advantage > stall_threshold_frames {
            self.stall_elapsed += frame_duration;
            if self.stall_elapsed <= stall_timer_duration {
                return Outcome::StallAdvantage;
            }
        } else {
            self.stall_elapsed = Fixed::ZERO;
        }

        if next_frame_input_missing {
            self.starve_elapsed += frame_duration;
            if self.starve_elapsed <= starvation_timer_duration {
                return Outcome::StarvedForInput;
            }
        } else {
            self.starve_elapsed = Fixed::ZERO;
        }

        let double_frame = frame_duration.saturating_mul_u32(2);
        if allow_double_simulation && !self.double_sim_forced_off && self.tick_accumulator >= double_frame {
            self.double_sim_elapsed += double_frame;
            if self.double_sim_elapsed > double_simulation_timer_duration {
                self.double_sim_forced_off = true;
            } else {
                self.tick_accumulator -= double_frame;
                return Outcome::DoubleSimulation;
            }
        }

        self.tick_accumulator -= frame_duration;
        Outcome::ToNext
    }

    /// Drops accumulated time and grace-timer state, re-enabling
    /// double-simulation if it had been forced off.
    pub fn reset(&mut self) {
        self.tick_accumulator = Fixed::ZERO;
        self.stall_elapsed = Fixed::ZERO;
        self.starve_elapsed = Fixed::ZERO;
        self.double_sim_elapsed = Fixed::ZERO;
        self.double_sim_forced_off = false;
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    const FRAME: Fixed = Fixed::from_micros(16_667);

    const GRACE_TIMER: Fixed = Fixed::from_micros(50_000);

    #[allow(clippy::too_many_arguments)]
    fn decide_default(scheduler: &mut TickScheduler, advantage: i32, missing: bool, allow_double: bool) -> Outcome {
        scheduler.decide(FRAME, true, advantage, 4, GRACE_TIMER, missing, GRACE_TIMER, allow_double, GRACE_TIMER)
    }

    #[test]
    fn no_active_emulator_takes_priority() {
        let mut scheduler = TickScheduler::new();
        scheduler.integrate(FRAME);
        let outcome = scheduler.decide(FRAME, false, 0, 4, Fixed::ZERO, false, Fixed::ZERO, true, Fixed::ZERO);
        assert_eq!(outcome, Outcome::NoActiveEmulator);
    }

    #[test]
    fn partial_accumulator_stays_current() {
        let mut scheduler = TickScheduler::new();
        scheduler.integrate(Fixed::from_micros(1_000));
        assert_eq!(decide_default(&mut scheduler, 0, false, true), Outcome::StayCurrent);
    }

    #[test]
    fn full_frame_advances_to_next() {
        let mut scheduler = TickScheduler::new();
        scheduler.integrate(FRAME);
        assert_eq!(decide_default(&mut scheduler, 0, false, true), Outcome::ToNext);
    }

    #[test]
    fn double_frame_double_simulates_when_allowed() {
        let mut scheduler = TickScheduler::new();
        scheduler.integrate(FRAME.saturating_mul_u32(2));
        assert_eq!(decide_default(&mut scheduler, 0, false, true), Outcome::DoubleSimulation);
    }

    #[test]
    fn double_frame_falls_back_to_to_next_when_disallowed() {
        let mut scheduler = TickScheduler::new();
        scheduler.integrate(FRAME.saturating_mul_u32(2));
        assert_eq!(decide_default(&mut scheduler, 0, false, false), Outcome::ToNext);
    }

    #[test]
    fn stall_outranks_starvation_and_double_simulation() {
        let mut scheduler = TickScheduler::new();
        scheduler.integrate(FRAME.saturating_mul_u32(2));
        assert_eq!(decide_default(&mut scheduler, 10, true, true), Outcome::StallAdvantage);
    }

    #[test]
    fn starvation_outranks_double_simulation() {
        let mut scheduler = TickScheduler::new();
        scheduler.integrate(FRAME.saturating_mul_u32(2));
        assert_eq!(decide_default(&mut scheduler, 0, true, true), Outcome::StarvedForInput);
    }

    #[test]
    fn double_simulation_forces_off_after_its_grace_timer() {
        let mut scheduler = TickScheduler::new();
        let short_timer = Fixed::from_micros(20_000);
        let mut last = Outcome::StayCurrent;
        for _ in 0..4 {
            scheduler.integrate(FRAME.saturating_mul_u32(2));
            last = scheduler.decide(FRAME, true, 0, 4, GRACE_TIMER, false, GRACE_TIMER, true, short_timer);
        }
        assert_eq!(last, Outcome::ToNext);
    }

    #[test]
    fn expired_stall_timer_falls_through_to_starvation() {
        let mut scheduler = TickScheduler::new();
        let mut last = Outcome::StayCurrent;
        for _ in 0..4 {
            scheduler.integrate(FRAME);
            last = decide_default(&mut scheduler, 10, true, true);
        }
        assert_eq!(last, Outcome::StarvedForInput);
    }
}
