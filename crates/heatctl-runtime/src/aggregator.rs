//! [`Aggregator`] – one reading per sensor per cycle.
//!
//! Holds a fixed number of slots, one per configured sensor, each either
//! unset or holding the latest temperature reported in the current cycle.
//! A sensor that reports twice before the cycle completes simply
//! overwrites its slot.
//!
//! # Example
//!
//! ```rust
//! use heatctl_runtime::aggregator::Aggregator;
//! use heatctl_types::TemperatureReading;
//!
//! let mut agg = Aggregator::new(2);
//! assert!(!agg.record(&TemperatureReading::temperature(0, 20.0)).unwrap());
//! assert!(agg.record(&TemperatureReading::temperature(1, 21.0)).unwrap());
//! assert_eq!(agg.average(), Some(20.5));
//! ```

use heatctl_types::{HeatError, TEMPERATURE_KIND, TemperatureReading};

/// Per-cycle reading cache.  The slot count never changes after
/// construction; unknown sensor identities are rejected, not added.
#[derive(Debug, Clone)]
pub struct Aggregator {
    slots: Vec<Option<f64>>,
}

impl Aggregator {
    /// Create a cache with `sensors_count` unset slots.
    pub fn new(sensors_count: usize) -> Self {
        Self {
            slots: vec![None; sensors_count],
        }
    }

    /// Store `reading` in its sensor's slot, overwriting any earlier value
    /// from this cycle.
    ///
    /// Returns whether every slot is now set.
    ///
    /// # Errors
    ///
    /// Returns [`HeatError::MalformedReading`] and leaves the cache untouched
    /// when the sensor identity is out of range, the kind is not
    /// `"temperature"`, or the value is not finite.
    pub fn record(&mut self, reading: &TemperatureReading) -> Result<bool, HeatError> {
        let malformed = |reason: String| HeatError::MalformedReading {
            sensor_id: reading.sensor_id,
            reason,
        };

        if reading.kind != TEMPERATURE_KIND {
            return Err(malformed(format!("unknown reading kind '{}'", reading.kind)));
        }
        if !reading.temperature.is_finite() {
            return Err(malformed(format!("non-finite temperature {}", reading.temperature)));
        }
        let capacity = self.slots.len();
        let slot = self
            .slots
            .get_mut(reading.sensor_id as usize)
            .ok_or_else(|| malformed(format!("unknown sensor, expected id below {capacity}")))?;

        *slot = Some(reading.temperature);
        Ok(self.is_complete())
    }

    /// `true` when every slot holds a value.
    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// Clear every slot back to unset.
    pub fn reset(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }

    /// Number of slots currently set.
    pub fn received(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Number of slots (the configured sensor count).
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// The value stored for `sensor_id` in this cycle, if any.
    pub fn slot(&self, sensor_id: usize) -> Option<f64> {
        self.slots.get(sensor_id).copied().flatten()
    }

    /// Arithmetic mean of all slots rounded half-up to one decimal place.
    ///
    /// `None` until the cycle is complete.
    pub fn average(&self) -> Option<f64> {
        if self.slots.is_empty() || !self.is_complete() {
            return None;
        }
        let total: f64 = self.slots.iter().flatten().sum();
        Some(round_half_up_tenth(total / self.slots.len() as f64))
    }
}

/// Round to one decimal place, ties toward positive infinity.
pub fn round_half_up_tenth(value: f64) -> f64 {
    (value * 10.0 + 0.5).floor() / 10.0
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// For any permutation of identities, the cache completes exactly on
        /// the N-th distinct identity and never before.
        #[test]
        fn complete_exactly_on_last_distinct_identity(
            order in (1usize..16).prop_flat_map(|n| Just((0..n as u32).collect::<Vec<_>>()).prop_shuffle())
        ) {
            let n = order.len();
            let mut agg = Aggregator::new(n);
            for (i, id) in order.iter().enumerate() {
                let complete = agg.record(&TemperatureReading::temperature(*id, 20.0)).unwrap();
                prop_assert_eq!(complete, i + 1 == n);
                prop_assert_eq!(agg.is_complete(), i + 1 == n);
            }
        }

        /// Any N-1 subset of identities leaves the cache incomplete.
        #[test]
        fn missing_one_identity_stays_incomplete(n in 1usize..16, skip_seed in any::<usize>()) {
            let skip = skip_seed % n;
            let mut agg = Aggregator::new(n);
            for id in (0..n).filter(|id| *id != skip) {
                agg.record(&TemperatureReading::temperature(id as u32, 18.5)).unwrap();
            }
            prop_assert!(!agg.is_complete());
            prop_assert_eq!(agg.average(), None);
        }

        /// Last write wins: only the final value for a sensor counts.
        #[test]
        fn last_write_wins(first in -50.0f64..50.0, second in -50.0f64..50.0) {
            let mut agg = Aggregator::new(2);
            agg.record(&TemperatureReading::temperature(0, first)).unwrap();
            agg.record(&TemperatureReading::temperature(0, second)).unwrap();
            agg.record(&TemperatureReading::temperature(1, second)).unwrap();
            prop_assert_eq!(agg.average(), Some(round_half_up_tenth(second)));
        }
    }
}
