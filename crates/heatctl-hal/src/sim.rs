//! In-process valve simulation for running without physical hardware.
//!
//! # Example
//!
//! ```rust
//! use heatctl_hal::{SimValve, Valve};
//! use heatctl_types::ValveLevel;
//!
//! let mut valve = SimValve::new("room-1");
//! valve.set_level(ValveLevel::NEUTRAL).expect("sim valve must succeed");
//! assert_eq!(valve.level(), Some(ValveLevel::NEUTRAL));
//! ```

use heatctl_types::{HeatError, ValveLevel};

use crate::valve::Valve;

/// A simulated valve that records every applied level.
///
/// Built with [`SimValve::faulty`] it rejects every command instead, which
/// lets tests and demo runs exercise the controller's rejection path.
pub struct SimValve {
    id: String,
    level: Option<ValveLevel>,
    applied: Vec<ValveLevel>,
    faulty: bool,
}

impl SimValve {
    /// A healthy valve with no level applied yet.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            level: None,
            applied: Vec::new(),
            faulty: false,
        }
    }

    /// A valve that fails every `set_level` call.
    pub fn faulty(id: impl Into<String>) -> Self {
        Self {
            faulty: true,
            ..Self::new(id)
        }
    }

    /// Every level successfully applied, oldest first.
    pub fn applied(&self) -> &[ValveLevel] {
        &self.applied
    }
}

impl Valve for SimValve {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_level(&mut self, level: ValveLevel) -> Result<(), HeatError> {
        if self.faulty {
            return Err(HeatError::HardwareFault {
                component: self.id.clone(),
                details: format!("valve stuck, cannot move to {level}"),
            });
        }
        self.level = Some(level);
        self.applied.push(level);
        Ok(())
    }

    fn level(&self) -> Option<ValveLevel> {
        self.level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_valve_records_history() {
        let mut valve = SimValve::new("room-1");
        valve.set_level(ValveLevel::NEUTRAL).unwrap();
        valve.set_level(ValveLevel::clamped(75)).unwrap();
        assert_eq!(valve.level(), Some(ValveLevel::clamped(75)));
        assert_eq!(valve.applied(), &[ValveLevel::NEUTRAL, ValveLevel::clamped(75)]);
    }

    #[test]
    fn faulty_valve_rejects_and_keeps_level_undefined() {
        let mut valve = SimValve::faulty("room-1");
        let err = valve.set_level(ValveLevel::OPEN).unwrap_err();
        assert!(matches!(err, HeatError::HardwareFault { ref component, .. } if component == "room-1"));
        assert_eq!(valve.level(), None);
        assert!(valve.applied().is_empty());
    }
}
