//! Process configuration – reads `heatctl.toml`.
//!
//! Every key is optional; a missing file means all defaults.  Values from
//! the file can be overridden through `HEATCTL_*` environment variables.

use std::fs;
use std::path::Path;
use std::time::Duration;

use heatctl_hal::SensorSettings;
use heatctl_runtime::ControllerConfig;
use heatctl_types::{HeatError, SensorId, ValveLevel};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Top-level `heatctl.toml` contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Target aggregate temperature.
    #[serde(default = "default_setpoint")]
    pub setpoint: f64,

    #[serde(default = "default_sensors_count")]
    pub sensors_count: u32,

    /// How long the controller waits for a valve acknowledgment.
    #[serde(default = "default_measure_timeout_ms")]
    pub measure_timeout_ms: u64,

    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    #[serde(default = "default_neutral_level")]
    pub neutral_level: u32,

    /// Total run time before the process shuts itself down.
    #[serde(default = "default_work_time_secs")]
    pub work_time_secs: u64,

    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,

    #[serde(default = "default_valve_id")]
    pub valve_id: String,

    #[serde(default)]
    pub sensor: SensorSection,

    #[serde(default)]
    pub valve: ValveSection,
}

/// `[sensor]` – simulated sensor parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSection {
    #[serde(default = "default_initial_temperature")]
    pub initial_temperature: f64,

    /// Degrees between neighbouring sensors' starting temperatures.
    #[serde(default = "default_spread")]
    pub spread: f64,

    #[serde(default = "default_ambient_loss")]
    pub ambient_loss: f64,

    #[serde(default = "default_report_interval_ms")]
    pub report_interval_ms: u64,
}

/// `[valve]` – simulated actuator parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValveSection {
    #[serde(default = "default_response_delay_ms")]
    pub response_delay_ms: u64,

    /// Reject every command.
    #[serde(default)]
    pub faulty: bool,
}

fn default_setpoint() -> f64 {
    22.0
}
fn default_sensors_count() -> u32 {
    3
}
fn default_measure_timeout_ms() -> u64 {
    2_000
}
fn default_settle_delay_ms() -> u64 {
    1_000
}
fn default_neutral_level() -> u32 {
    u32::from(ValveLevel::NEUTRAL.get())
}
fn default_work_time_secs() -> u64 {
    60
}
fn default_bus_capacity() -> usize {
    256
}
fn default_valve_id() -> String {
    "room-1".to_string()
}
fn default_initial_temperature() -> f64 {
    18.0
}
fn default_spread() -> f64 {
    0.5
}
fn default_ambient_loss() -> f64 {
    0.5
}
fn default_report_interval_ms() -> u64 {
    500
}
fn default_response_delay_ms() -> u64 {
    100
}

impl Default for Config {
    fn default() -> Self {
        Self {
            setpoint: default_setpoint(),
            sensors_count: default_sensors_count(),
            measure_timeout_ms: default_measure_timeout_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            neutral_level: default_neutral_level(),
            work_time_secs: default_work_time_secs(),
            bus_capacity: default_bus_capacity(),
            valve_id: default_valve_id(),
            sensor: SensorSection::default(),
            valve: ValveSection::default(),
        }
    }
}

impl Default for SensorSection {
    fn default() -> Self {
        Self {
            initial_temperature: default_initial_temperature(),
            spread: default_spread(),
            ambient_loss: default_ambient_loss(),
            report_interval_ms: default_report_interval_ms(),
        }
    }
}

impl Default for ValveSection {
    fn default() -> Self {
        Self {
            response_delay_ms: default_response_delay_ms(),
            faulty: false,
        }
    }
}

impl SensorSection {
    /// Starting temperature for sensor `id`: sensors are spaced `spread`
    /// apart, centred on `initial_temperature`.
    pub fn initial_temperature_for(&self, id: SensorId, sensors_count: u32) -> f64 {
        let centre = f64::from(sensors_count.saturating_sub(1)) / 2.0;
        self.initial_temperature + self.spread * (f64::from(id) - centre)
    }

    pub fn settings(&self) -> SensorSettings {
        SensorSettings {
            ambient_loss: self.ambient_loss,
            report_interval: Duration::from_millis(self.report_interval_ms),
        }
    }
}

impl Config {
    pub fn work_time(&self) -> Duration {
        Duration::from_secs(self.work_time_secs)
    }

    pub fn response_delay(&self) -> Duration {
        Duration::from_millis(self.valve.response_delay_ms)
    }

    /// Validate and convert into the controller's configuration.
    pub fn controller_config(&self) -> Result<ControllerConfig, HeatError> {
        let neutral_level = ValveLevel::new(self.neutral_level).map_err(|_| {
            HeatError::ConfigurationInvalid(format!(
                "neutral_level must be within 0..=100, got {}",
                self.neutral_level
            ))
        })?;
        if self.bus_capacity == 0 {
            return Err(HeatError::ConfigurationInvalid(
                "bus_capacity must be positive".to_string(),
            ));
        }
        if self.work_time_secs == 0 {
            return Err(HeatError::ConfigurationInvalid(
                "work_time_secs must be positive".to_string(),
            ));
        }
        let sensor = &self.sensor;
        if !sensor.initial_temperature.is_finite()
            || !sensor.spread.is_finite()
            || !sensor.ambient_loss.is_finite()
        {
            return Err(HeatError::ConfigurationInvalid(
                "sensor temperatures must be finite".to_string(),
            ));
        }

        let cfg = ControllerConfig {
            setpoint: self.setpoint,
            sensors_count: self.sensors_count,
            ack_timeout: Duration::from_millis(self.measure_timeout_ms),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            neutral_level,
            valve_id: self.valve_id.clone(),
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Read `path`, fall back to defaults when it does not exist, then apply
/// environment overrides.
pub fn load(path: &Path) -> Result<Config, HeatError> {
    let mut cfg = match load_from(path)? {
        Some(cfg) => cfg,
        None => {
            warn!(path = %path.display(), "config file not found, using defaults");
            Config::default()
        }
    };
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Parse the config at `path`.  Returns `None` if the file does not exist.
pub fn load_from(path: &Path) -> Result<Option<Config>, HeatError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        HeatError::Configuration(format!("failed to read {}: {e}", path.display()))
    })?;
    let cfg = toml::from_str(&raw).map_err(|e| {
        HeatError::Configuration(format!("failed to parse {}: {e}", path.display()))
    })?;
    Ok(Some(cfg))
}

/// Apply `HEATCTL_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `HEATCTL_SETPOINT` | `setpoint` |
/// | `HEATCTL_SENSORS_COUNT` | `sensors_count` |
/// | `HEATCTL_MEASURE_TIMEOUT_MS` | `measure_timeout_ms` |
/// | `HEATCTL_WORK_TIME_SECS` | `work_time_secs` |
///
/// Unparsable values are ignored with a warning.
pub fn apply_env_overrides(cfg: &mut Config) {
    override_from_env("HEATCTL_SETPOINT", &mut cfg.setpoint);
    override_from_env("HEATCTL_SENSORS_COUNT", &mut cfg.sensors_count);
    override_from_env("HEATCTL_MEASURE_TIMEOUT_MS", &mut cfg.measure_timeout_ms);
    override_from_env("HEATCTL_WORK_TIME_SECS", &mut cfg.work_time_secs);
}

fn override_from_env<T: std::str::FromStr>(var: &str, field: &mut T) {
    let Ok(raw) = std::env::var(var) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *field = value,
        Err(_) => warn!(var, value = %raw, "ignoring unparsable override"),
    }
}
