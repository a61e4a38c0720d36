//! [`SensorSim`] – simulated room temperature sensors.
//!
//! Each sensor publishes one reading on start, then waits for a
//! [`EventPayload::LevelBroadcast`] addressed to it.  On every broadcast it
//! loses a fixed amount of heat to the environment, gains or loses a
//! percentage given by [`temperature_change_percent`], publishes the new
//! reading, and rests for its report interval.
//!
//! Drift is deterministic so whole-loop tests are reproducible.

use std::time::Duration;

use heatctl_middleware::{EventBus, ShutdownSignal, Topic, TopicReceiver};
use heatctl_types::{Event, EventPayload, HeatError, SensorId, TemperatureReading, ValveLevel};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Fixed response table: percent temperature change produced by a valve
/// level.  Neutral (50) holds the temperature; each band of ten away from
/// neutral adds one percent in that direction.
pub fn temperature_change_percent(level: ValveLevel) -> i32 {
    match level.get() {
        0..=9 => -5,
        10..=19 => -4,
        20..=29 => -3,
        30..=39 => -2,
        40..=49 => -1,
        50 => 0,
        51..=60 => 1,
        61..=70 => 2,
        71..=80 => 3,
        81..=90 => 4,
        _ => 5,
    }
}

/// Knobs shared by every simulated sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorSettings {
    /// Degrees lost to the environment before each valve response.
    pub ambient_loss: f64,
    /// Pause after publishing a reading triggered by a broadcast.
    pub report_interval: Duration,
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            ambient_loss: 0.5,
            report_interval: Duration::from_millis(500),
        }
    }
}

pub struct SensorSim {
    id: SensorId,
    temperature: f64,
    settings: SensorSettings,
    bus: EventBus,
}

impl SensorSim {
    /// `id` must be unique and below the controller's configured sensor
    /// count; the caller is responsible for handing them out.
    pub fn new(id: SensorId, initial_temperature: f64, settings: SensorSettings, bus: EventBus) -> Self {
        Self {
            id,
            temperature: round_tenth(initial_temperature),
            settings,
            bus,
        }
    }

    /// React to a new valve level and return the new temperature.
    pub fn apply_level(&mut self, level: ValveLevel) -> f64 {
        let cooled = self.temperature - self.settings.ambient_loss;
        let percent = f64::from(temperature_change_percent(level));
        self.temperature = round_tenth(cooled + cooled * percent / 100.0);
        self.temperature
    }

    /// Publish the current temperature on [`Topic::Readings`].
    pub fn publish_reading(&self) -> Result<usize, HeatError> {
        let reading = TemperatureReading::temperature(self.id, self.temperature);
        self.bus.publish_to(
            Topic::Readings,
            Event::new(format!("heatctl-hal::sensor-{}", self.id), EventPayload::Reading(reading)),
        )
    }

    /// Subscribe to level broadcasts and run the sensor on a new task.
    pub fn spawn(self, shutdown: ShutdownSignal) -> JoinHandle<()> {
        let broadcasts = self.bus.subscribe_to(Topic::LevelBroadcast);
        tokio::spawn(self.run(broadcasts, shutdown))
    }

    async fn run(mut self, mut broadcasts: TopicReceiver, mut shutdown: ShutdownSignal) {
        info!(sensor_id = self.id, temperature = self.temperature, "sensor started");
        self.report();

        loop {
            let event = tokio::select! {
                _ = shutdown.wait() => break,
                received = broadcasts.recv() => match received {
                    Ok(event) => event,
                    Err(RecvError::Lagged(n)) => {
                        warn!(sensor_id = self.id, lagged_by = n, "sensor missed level broadcasts");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            };

            let EventPayload::LevelBroadcast { sensor_id, level } = event.payload else {
                continue;
            };
            if sensor_id != self.id {
                continue;
            }

            let before = self.temperature;
            let after = self.apply_level(level);
            debug!(sensor_id = self.id, level = %level, before, after, "sensor reacted to valve level");
            self.report();

            tokio::select! {
                _ = shutdown.wait() => break,
                _ = tokio::time::sleep(self.settings.report_interval) => {}
            }
        }
        info!(sensor_id = self.id, temperature = self.temperature, "sensor stopped");
    }

    fn report(&self) {
        if let Err(e) = self.publish_reading() {
            warn!(sensor_id = self.id, error = %e, "reading not delivered");
        }
    }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
