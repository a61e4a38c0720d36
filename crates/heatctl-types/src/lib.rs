//! `heatctl-types` – shared wire and domain types for heatctl.
//!
//! Everything that crosses the event bus lives here, together with the
//! workspace-wide [`HeatError`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Identity of a temperature sensor, assigned by whoever constructs it.
/// Valid identities are `0..sensors_count`.
pub type SensorId = u32;

/// The only reading kind the controller accepts.
pub const TEMPERATURE_KIND: &str = "temperature";

/// Valve openness percentage: 0 = fully closed, 100 = fully open.
///
/// The inner value is guaranteed to lie in `[0, 100]`.  Deserialisation
/// clamps out-of-range inputs to 100 instead of rejecting them, because
/// actuator confirmations are trusted for presence, not for range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u8")]
pub struct ValveLevel(u8);

impl ValveLevel {
    pub const CLOSED: ValveLevel = ValveLevel(0);
    pub const NEUTRAL: ValveLevel = ValveLevel(50);
    pub const OPEN: ValveLevel = ValveLevel(100);

    /// Build a level, rejecting anything above 100.
    pub fn new(value: u32) -> Result<Self, HeatError> {
        if value > 100 {
            return Err(HeatError::InvalidLevel(value));
        }
        Ok(Self(value as u8))
    }

    /// Build a level, clamping anything above 100 down to 100.
    pub fn saturating(value: u32) -> Self {
        Self(value.min(100) as u8)
    }

    /// Build a level from a signed value, clamping into `[0, 100]`.
    pub fn clamped(value: i64) -> Self {
        Self(value.clamp(0, 100) as u8)
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for ValveLevel {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

impl From<u32> for ValveLevel {
    fn from(value: u32) -> Self {
        Self::saturating(value)
    }
}

impl From<ValveLevel> for u8 {
    fn from(level: ValveLevel) -> Self {
        level.0
    }
}

impl fmt::Display for ValveLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// A single measurement published by a sensor on the readings topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureReading {
    #[serde(rename = "sensorIdentity")]
    pub sensor_id: SensorId,
    /// Must equal [`TEMPERATURE_KIND`] for the reading to be accepted.
    pub kind: String,
    #[serde(rename = "measuredTemperature")]
    pub temperature: f64,
}

impl TemperatureReading {
    /// Convenience constructor for a well-formed temperature reading.
    pub fn temperature(sensor_id: SensorId, temperature: f64) -> Self {
        Self {
            sensor_id,
            kind: TEMPERATURE_KIND.to_string(),
            temperature,
        }
    }
}

/// Unified event wrapper for the in-process event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "heatctl-hal::sensor-2"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Wrap `payload` in a fresh envelope stamped with the current time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the internal event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Sensor → controller.
    Reading(TemperatureReading),
    /// Controller → actuator: apply this level.
    SetValveLevel { valve_id: String, level: ValveLevel },
    /// Actuator → controller: the level was applied.
    ValveConfirmed { valve_id: String, level: ValveLevel },
    /// Actuator → controller: the level could not be applied.
    ValveRejected {
        valve_id: String,
        level: ValveLevel,
        reason: String,
    },
    /// Controller → sensor: the valve now sits at `level`.  One message is
    /// addressed to each configured sensor.
    LevelBroadcast { sensor_id: SensorId, level: ValveLevel },
}

/// Global error type spanning malformed input, actuator failures, bus
/// failures and configuration problems.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HeatError {
    #[error("Malformed reading from sensor {sensor_id}: {reason}")]
    MalformedReading { sensor_id: SensorId, reason: String },

    #[error("Actuator did not confirm level {level} within {timeout_ms} ms")]
    ActuatorTimeout { level: ValveLevel, timeout_ms: u64 },

    #[error("Actuator rejected level {level}: {reason}")]
    ActuatorRejected { level: ValveLevel, reason: String },

    #[error("Invalid configuration: {0}")]
    ConfigurationInvalid(String),

    #[error("Configuration Error: {0}")]
    Configuration(String),

    #[error("Bus Channel Error: {0}")]
    Channel(String),

    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Valve level {0} is outside 0..=100")]
    InvalidLevel(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valve_level_new_rejects_out_of_range() {
        assert_eq!(ValveLevel::new(100).unwrap().get(), 100);
        assert_eq!(ValveLevel::new(101), Err(HeatError::InvalidLevel(101)));
    }

    #[test]
    fn valve_level_clamped_handles_negative() {
        assert_eq!(ValveLevel::clamped(-7), ValveLevel::CLOSED);
        assert_eq!(ValveLevel::clamped(130), ValveLevel::OPEN);
        assert_eq!(ValveLevel::clamped(42).get(), 42);
    }

    #[test]
    fn confirmation_with_out_of_range_level_is_clamped() {
        let json = r#"{"type":"valve_confirmed","valve_id":"room-1","level":250}"#;
        let payload: EventPayload = serde_json::from_str(json).unwrap();
        assert_eq!(
            payload,
            EventPayload::ValveConfirmed {
                valve_id: "room-1".to_string(),
                level: ValveLevel::OPEN,
            }
        );
    }

    #[test]
    fn reading_uses_wire_field_names() {
        let reading = TemperatureReading::temperature(3, 21.5);
        let json = serde_json::to_value(&reading).unwrap();
        assert_eq!(json["sensorIdentity"], 3);
        assert_eq!(json["kind"], "temperature");
        assert_eq!(json["measuredTemperature"], 21.5);
    }

    #[test]
    fn event_roundtrip() {
        let event = Event::new(
            "heatctl-runtime::controller",
            EventPayload::SetValveLevel {
                valve_id: "room-1".to_string(),
                level: ValveLevel::NEUTRAL,
            },
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event.id, back.id);
        assert_eq!(event.payload, back.payload);
    }

    #[test]
    fn heat_error_display() {
        let err = HeatError::ActuatorTimeout {
            level: ValveLevel::NEUTRAL,
            timeout_ms: 250,
        };
        assert!(err.to_string().contains("250 ms"));

        let err2 = HeatError::MalformedReading {
            sensor_id: 9,
            reason: "unknown sensor".to_string(),
        };
        assert!(err2.to_string().contains("sensor 9"));
    }
}
