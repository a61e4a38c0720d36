//! Generic `Valve` trait for the room's heating valve.
//!
//! Drivers implement this trait and are wrapped by a
//! [`ValveDriver`][crate::driver::ValveDriver], which connects them to the
//! bus.  The controller never talks to a driver directly, so drivers can be
//! swapped without touching the control loop.

use heatctl_types::{HeatError, ValveLevel};

/// A proportional valve whose openness is set in percent.
pub trait Valve: Send + Sync {
    /// Stable identifier, e.g. `"room-1"`.  Commands addressed to another
    /// identifier are ignored by the driver.
    fn id(&self) -> &str;

    /// Move the valve to `level`.
    ///
    /// # Errors
    ///
    /// Returns [`HeatError::HardwareFault`] if the command cannot be applied.
    fn set_level(&mut self, level: ValveLevel) -> Result<(), HeatError>;

    /// The most recently applied level, or `None` before the first command.
    fn level(&self) -> Option<ValveLevel>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockValve {
        id: String,
        level: Option<ValveLevel>,
    }

    impl Valve for MockValve {
        fn id(&self) -> &str {
            &self.id
        }

        fn set_level(&mut self, level: ValveLevel) -> Result<(), HeatError> {
            self.level = Some(level);
            Ok(())
        }

        fn level(&self) -> Option<ValveLevel> {
            self.level
        }
    }

    #[test]
    fn mock_valve_starts_undefined_then_records_level() {
        let mut valve = MockValve {
            id: "room-1".to_string(),
            level: None,
        };
        assert_eq!(valve.id(), "room-1");
        assert_eq!(valve.level(), None);

        valve.set_level(ValveLevel::OPEN).unwrap();
        assert_eq!(valve.level(), Some(ValveLevel::OPEN));
    }
}
