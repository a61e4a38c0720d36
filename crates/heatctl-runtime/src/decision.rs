//! [`DecisionEngine`] – maps an aggregate temperature to a valve level.
//!
//! # Algorithm
//!
//! 1. No level applied yet: return the neutral level, whatever the average.
//! 2. Average equal to the setpoint: hold the previous level.
//! 3. Otherwise express the average as a percentage of the setpoint, capped
//!    at 200, and take its distance from 100 (`percent_difference`).
//! 4. `delta = neutral * trunc(percent_difference) / 100` in integer
//!    arithmetic.
//! 5. Above the setpoint move `delta` toward closed, below it move `delta`
//!    toward open, starting from the neutral level (not the previous one).
//! 6. Clamp into `[0, 100]`.  Only averages at or below zero can push the
//!    raw result past 100; the clamp is the sole correction applied.
//!
//! # Example
//!
//! ```rust
//! use heatctl_runtime::decision::DecisionEngine;
//! use heatctl_types::ValveLevel;
//!
//! let engine = DecisionEngine::new(20.0, ValveLevel::NEUTRAL);
//! assert_eq!(engine.compute_level(30.0, Some(ValveLevel::NEUTRAL)).get(), 25);
//! assert_eq!(engine.compute_level(10.0, Some(ValveLevel::NEUTRAL)).get(), 75);
//! ```

use heatctl_types::ValveLevel;
use tracing::debug;

/// Upper bound on the average expressed as a percentage of the setpoint.
const MAX_PERCENT_OF_SETPOINT: f64 = 200.0;

/// Pure level calculator configured with the setpoint and neutral level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionEngine {
    setpoint: f64,
    neutral: ValveLevel,
}

impl DecisionEngine {
    /// `setpoint` must be positive; the controller validates this before
    /// constructing an engine.
    pub fn new(setpoint: f64, neutral: ValveLevel) -> Self {
        Self { setpoint, neutral }
    }

    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    /// Compute the next valve level from a one-decimal `average`.
    pub fn compute_level(&self, average: f64, previous: Option<ValveLevel>) -> ValveLevel {
        let Some(previous) = previous else {
            debug!(neutral = %self.neutral, "no level applied yet, starting from neutral");
            return self.neutral;
        };

        if average == self.setpoint {
            return previous;
        }

        let one_percent = self.setpoint / 100.0;
        let percent_of = (average / one_percent).min(MAX_PERCENT_OF_SETPOINT);
        let percent_difference = if percent_of > 100.0 {
            percent_of - 100.0
        } else {
            100.0 - percent_of
        };

        let neutral = i64::from(self.neutral.get());
        let delta = neutral * (percent_difference as i64) / 100;
        let raw = if average > self.setpoint {
            neutral - delta
        } else {
            neutral + delta
        };

        debug!(average, percent_of, percent_difference, delta, raw, "computed valve level");
        ValveLevel::clamped(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> DecisionEngine {
        DecisionEngine::new(20.0, ValveLevel::NEUTRAL)
    }

    #[test]
    fn first_cycle_returns_neutral_regardless_of_inputs() {
        assert_eq!(engine().compute_level(99.0, None), ValveLevel::NEUTRAL);
        assert_eq!(engine().compute_level(-5.0, None), ValveLevel::NEUTRAL);
        let custom = DecisionEngine::new(20.0, ValveLevel::clamped(40));
        assert_eq!(custom.compute_level(20.0, None).get(), 40);
    }

    #[test]
    fn exact_match_holds_previous_level() {
        assert_eq!(engine().compute_level(20.0, Some(ValveLevel::NEUTRAL)).get(), 50);
        assert_eq!(engine().compute_level(20.0, Some(ValveLevel::clamped(73))).get(), 73);
    }

    #[test]
    fn above_setpoint_moves_toward_closed() {
        assert_eq!(engine().compute_level(30.0, Some(ValveLevel::NEUTRAL)).get(), 25);
    }

    #[test]
    fn below_setpoint_moves_toward_open() {
        assert_eq!(engine().compute_level(10.0, Some(ValveLevel::NEUTRAL)).get(), 75);
    }

    #[test]
    fn result_is_relative_to_neutral_not_previous() {
        assert_eq!(engine().compute_level(30.0, Some(ValveLevel::CLOSED)).get(), 25);
        assert_eq!(engine().compute_level(10.0, Some(ValveLevel::OPEN)).get(), 75);
    }

    #[test]
    fn percent_of_setpoint_is_capped_at_double() {
        assert_eq!(engine().compute_level(1000.0, Some(ValveLevel::NEUTRAL)), ValveLevel::CLOSED);
        assert_eq!(engine().compute_level(40.0, Some(ValveLevel::NEUTRAL)), ValveLevel::CLOSED);
    }

    #[test]
    fn percent_difference_is_truncated_before_scaling() {
        // 21.9 / 0.2 = 109.5 -> difference 9.5 -> trunc 9 -> 50 * 9 / 100 = 4
        assert_eq!(engine().compute_level(21.9, Some(ValveLevel::NEUTRAL)).get(), 46);
        // 18.5 / 0.2 = 92.5 -> difference 7.5 -> trunc 7 -> 50 * 7 / 100 = 3
        assert_eq!(engine().compute_level(18.5, Some(ValveLevel::NEUTRAL)).get(), 53);
    }

    #[test]
    fn freezing_average_saturates_open() {
        assert_eq!(engine().compute_level(0.0, Some(ValveLevel::NEUTRAL)), ValveLevel::OPEN);
        // Negative averages push the raw value past 100; only the clamp applies.
        assert_eq!(engine().compute_level(-20.0, Some(ValveLevel::NEUTRAL)), ValveLevel::OPEN);
    }
}
