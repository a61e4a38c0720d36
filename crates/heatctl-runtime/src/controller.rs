//! [`Controller`] – the control task and valve coordinator.
//!
//! Owns the [`Aggregator`], the current valve level and the
//! [`DecisionLedger`]; nothing else touches them.  Readings are processed
//! one at a time in arrival order.  For each reading:
//!
//! 1. **Record** – store it in the aggregator (malformed readings are
//!    logged and dropped).
//! 2. **Settle** – once every sensor has reported, wait the settle delay.
//! 3. **Compute** – average the cycle, append it to the ledger and ask the
//!    [`DecisionEngine`] for the next level.
//! 4. **Apply** – publish the level to the valve and wait for the
//!    acknowledgment, bounded by the acknowledgment timeout.  No further
//!    readings are looked at while waiting.
//! 5. **Confirm** – on success make the level current, reset the cache and
//!    send one level broadcast to each configured sensor.
//!
//! # Failed applications
//!
//! A timeout or rejection changes nothing: the level stays as it was and
//! the cache stays full.  Because the cache is still complete, the very
//! next reading (from any sensor) overwrites its slot and immediately
//! triggers another decision.  Sensors only report after a broadcast, so
//! if no stray reading arrives the loop stalls until restarted.

use std::ops::ControlFlow;
use std::time::Duration;

use heatctl_middleware::{EventBus, ShutdownSignal, Topic, TopicReceiver};
use heatctl_types::{Event, EventPayload, HeatError, TemperatureReading, ValveLevel};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::ack::{Acknowledgment, spawn_ack_listener};
use crate::aggregator::Aggregator;
use crate::decision::DecisionEngine;
use crate::ledger::DecisionLedger;

const SOURCE: &str = "heatctl-runtime::controller";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Values the control loop consumes.  Loading them is the caller's job.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// Target aggregate temperature.
    pub setpoint: f64,
    /// Number of sensors; readings must carry ids `0..sensors_count`.
    pub sensors_count: u32,
    /// Upper bound on the wait for an actuator acknowledgment.
    pub ack_timeout: Duration,
    /// Pause between a cycle completing and the average being computed.
    pub settle_delay: Duration,
    /// Level applied on the first cycle and used as the base for deltas.
    pub neutral_level: ValveLevel,
    /// Valve the commands are addressed to.
    pub valve_id: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            setpoint: 22.0,
            sensors_count: 3,
            ack_timeout: Duration::from_secs(2),
            settle_delay: Duration::from_secs(1),
            neutral_level: ValveLevel::NEUTRAL,
            valve_id: "room-1".to_string(),
        }
    }
}

impl ControllerConfig {
    /// Reject values the loop cannot run with.
    pub fn validate(&self) -> Result<(), HeatError> {
        if self.sensors_count == 0 {
            return Err(HeatError::ConfigurationInvalid(
                "sensors_count must be positive".to_string(),
            ));
        }
        if !self.setpoint.is_finite() || self.setpoint <= 0.0 {
            return Err(HeatError::ConfigurationInvalid(format!(
                "setpoint must be a positive temperature, got {}",
                self.setpoint
            )));
        }
        if self.ack_timeout.is_zero() {
            return Err(HeatError::ConfigurationInvalid(
                "acknowledgment timeout must be non-zero".to_string(),
            ));
        }
        if self.valve_id.is_empty() {
            return Err(HeatError::ConfigurationInvalid("valve_id must not be empty".to_string()));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Observable state
// ─────────────────────────────────────────────────────────────────────────────

/// Where the coordinator is in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Collecting readings.
    Idle,
    /// Cycle complete, settling and computing the average.
    Computing,
    /// Level published, waiting for the actuator.
    Applying,
    /// Last application succeeded.
    Confirmed,
    /// Last application got no answer in time.
    TimedOut,
    /// Last application was refused by the actuator.
    Rejected,
}

/// Cycle progress, derived on demand from the cache and current level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleState {
    pub received: usize,
    pub expected: usize,
    pub current_level: Option<ValveLevel>,
}

impl CycleState {
    pub fn is_complete(&self) -> bool {
        self.received == self.expected
    }

    /// No level has been confirmed yet.
    pub fn is_first_cycle(&self) -> bool {
        self.current_level.is_none()
    }
}

/// Snapshot published on every state change.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerStatus {
    pub phase: Phase,
    pub cycle: CycleState,
    pub last_average: Option<f64>,
    pub ledger_len: usize,
    pub confirmed_cycles: u64,
    pub failed_applications: u64,
}

/// Result of feeding one reading to the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadingOutcome {
    /// The reading was malformed and dropped.
    Discarded(HeatError),
    /// Stored; the cycle is not complete yet.
    Buffered,
    /// The cycle completed and a level application was attempted.
    Applied(Result<ValveLevel, HeatError>),
    /// A stop was requested while settling or waiting for the actuator.
    Stopped,
}

/// What the controller leaves behind when it stops.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerReport {
    pub current_level: Option<ValveLevel>,
    pub ledger: DecisionLedger,
    pub confirmed_cycles: u64,
    pub failed_applications: u64,
}

/// Task handles returned by [`Controller::spawn`].
pub struct ControllerHandles {
    pub controller: JoinHandle<ControllerReport>,
    pub ack_listener: JoinHandle<()>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Controller
// ─────────────────────────────────────────────────────────────────────────────

pub struct Controller {
    config: ControllerConfig,
    engine: DecisionEngine,
    aggregator: Aggregator,
    ledger: DecisionLedger,
    current_level: Option<ValveLevel>,
    phase: Phase,
    confirmed_cycles: u64,
    failed_applications: u64,
    bus: EventBus,
    status_tx: watch::Sender<ControllerStatus>,
}

impl Controller {
    /// Build a controller with an empty cache and no current level.
    ///
    /// # Errors
    ///
    /// Returns [`HeatError::ConfigurationInvalid`] when `config` fails
    /// [`ControllerConfig::validate`].
    pub fn new(config: ControllerConfig, bus: EventBus) -> Result<Self, HeatError> {
        config.validate()?;
        let engine = DecisionEngine::new(config.setpoint, config.neutral_level);
        let aggregator = Aggregator::new(config.sensors_count as usize);
        let initial = ControllerStatus {
            phase: Phase::Idle,
            cycle: CycleState {
                received: 0,
                expected: aggregator.capacity(),
                current_level: None,
            },
            last_average: None,
            ledger_len: 0,
            confirmed_cycles: 0,
            failed_applications: 0,
        };
        let (status_tx, _) = watch::channel(initial);
        Ok(Self {
            config,
            engine,
            aggregator,
            ledger: DecisionLedger::new(),
            current_level: None,
            phase: Phase::Idle,
            confirmed_cycles: 0,
            failed_applications: 0,
            bus,
            status_tx,
        })
    }

    /// Watch the controller's state from another task.
    pub fn status(&self) -> watch::Receiver<ControllerStatus> {
        self.status_tx.subscribe()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn current_level(&self) -> Option<ValveLevel> {
        self.current_level
    }

    pub fn ledger(&self) -> &DecisionLedger {
        &self.ledger
    }

    /// Re-derive the cycle state from the cache and the current level.
    pub fn cycle_state(&self) -> CycleState {
        CycleState {
            received: self.aggregator.received(),
            expected: self.aggregator.capacity(),
            current_level: self.current_level,
        }
    }

    /// Subscribe to readings, start the acknowledgment listener, and run the
    /// control task.  Both subscriptions exist before this returns.
    pub fn spawn(self, shutdown: ShutdownSignal) -> ControllerHandles {
        let readings = self.bus.subscribe_to(Topic::Readings);
        let (ack_listener, acks) =
            spawn_ack_listener(&self.bus, self.config.valve_id.clone(), shutdown.clone());
        let controller = tokio::spawn(self.run(readings, acks, shutdown));
        ControllerHandles {
            controller,
            ack_listener,
        }
    }

    /// Process readings until shutdown or until the bus closes.
    pub async fn run(
        mut self,
        mut readings: TopicReceiver,
        mut acks: mpsc::Receiver<Acknowledgment>,
        mut shutdown: ShutdownSignal,
    ) -> ControllerReport {
        info!(
            setpoint = self.config.setpoint,
            sensors = self.config.sensors_count,
            valve_id = %self.config.valve_id,
            "controller started"
        );

        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                received = readings.recv() => match received {
                    Ok(event) => event,
                    Err(RecvError::Lagged(n)) => {
                        warn!(lagged_by = n, "controller dropped readings");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            };

            let EventPayload::Reading(reading) = event.payload else {
                continue;
            };
            if self.step(reading, &mut acks, &mut shutdown).await.is_break() {
                break;
            }
        }

        self.set_phase(Phase::Idle);
        info!(
            level = ?self.current_level.map(ValveLevel::get),
            cycles = self.confirmed_cycles,
            failures = self.failed_applications,
            "controller stopped"
        );
        ControllerReport {
            current_level: self.current_level,
            ledger: self.ledger,
            confirmed_cycles: self.confirmed_cycles,
            failed_applications: self.failed_applications,
        }
    }

    async fn step(
        &mut self,
        reading: TemperatureReading,
        acks: &mut mpsc::Receiver<Acknowledgment>,
        shutdown: &mut ShutdownSignal,
    ) -> ControlFlow<()> {
        match self.handle_reading(reading, acks, shutdown).await {
            ReadingOutcome::Stopped => ControlFlow::Break(()),
            _ => ControlFlow::Continue(()),
        }
    }

    /// Feed one reading through record → settle → compute → apply.
    ///
    /// Every error is logged and reported in the outcome; none of them stop
    /// the controller.
    pub async fn handle_reading(
        &mut self,
        reading: TemperatureReading,
        acks: &mut mpsc::Receiver<Acknowledgment>,
        shutdown: &mut ShutdownSignal,
    ) -> ReadingOutcome {
        if matches!(self.phase, Phase::Confirmed | Phase::TimedOut | Phase::Rejected) {
            self.set_phase(Phase::Idle);
        }

        let complete = match self.aggregator.record(&reading) {
            Ok(complete) => complete,
            Err(e) => {
                warn!(error = %e, "discarding reading");
                return ReadingOutcome::Discarded(e);
            }
        };
        debug!(
            sensor_id = reading.sensor_id,
            temperature = reading.temperature,
            received = self.aggregator.received(),
            expected = self.aggregator.capacity(),
            "reading recorded"
        );
        if !complete {
            self.publish_status();
            return ReadingOutcome::Buffered;
        }

        self.set_phase(Phase::Computing);
        tokio::select! {
            _ = shutdown.wait() => return ReadingOutcome::Stopped,
            _ = tokio::time::sleep(self.config.settle_delay) => {}
        }

        let Some(average) = self.aggregator.average() else {
            return ReadingOutcome::Buffered;
        };
        self.ledger.push(average);
        info!(average, history = ?self.ledger.entries(), "cycle complete");

        let level = self.engine.compute_level(average, self.current_level);
        match self.current_level {
            None => info!(level = %level, "setting valve to neutral level"),
            Some(current) if average == self.engine.setpoint() => {
                info!(level = %current, "setpoint reached, holding valve level")
            }
            Some(current) => info!(from = %current, to = %level, "changing valve level"),
        }

        match self.apply_level(level, acks, shutdown).await {
            Some(result) => ReadingOutcome::Applied(result),
            None => ReadingOutcome::Stopped,
        }
    }

    /// Publish `level` and wait for the actuator.  `None` means a stop was
    /// requested mid-wait.
    #[instrument(skip_all, fields(level = %level))]
    async fn apply_level(
        &mut self,
        level: ValveLevel,
        acks: &mut mpsc::Receiver<Acknowledgment>,
        shutdown: &mut ShutdownSignal,
    ) -> Option<Result<ValveLevel, HeatError>> {
        while let Ok(stale) = acks.try_recv() {
            debug!(ack = ?stale, "discarding stale acknowledgment");
        }

        self.set_phase(Phase::Applying);
        let command = EventPayload::SetValveLevel {
            valve_id: self.config.valve_id.clone(),
            level,
        };
        if let Err(e) = self
            .bus
            .publish_to(Topic::ValveCommands, Event::new(SOURCE, command))
        {
            return Some(self.fail(e, Phase::TimedOut));
        }

        let waited = tokio::select! {
            _ = shutdown.wait() => return None,
            waited = tokio::time::timeout(self.config.ack_timeout, acks.recv()) => waited,
        };

        let result = match waited {
            Err(_) => self.fail(
                HeatError::ActuatorTimeout {
                    level,
                    timeout_ms: self.config.ack_timeout.as_millis() as u64,
                },
                Phase::TimedOut,
            ),
            Ok(None) => self.fail(
                HeatError::Channel("acknowledgment listener has stopped".to_string()),
                Phase::TimedOut,
            ),
            Ok(Some(Acknowledgment::Rejected { reason, .. })) => {
                self.fail(HeatError::ActuatorRejected { level, reason }, Phase::Rejected)
            }
            Ok(Some(Acknowledgment::Confirmed { level: acked })) => {
                if acked != level {
                    warn!(requested = %level, acknowledged = %acked, "actuator confirmed a different level");
                }
                self.confirm(level);
                Ok(level)
            }
        };
        Some(result)
    }

    fn confirm(&mut self, level: ValveLevel) {
        self.current_level = Some(level);
        self.aggregator.reset();
        self.confirmed_cycles += 1;

        let mut delivered = 0;
        for sensor_id in 0..self.config.sensors_count {
            let payload = EventPayload::LevelBroadcast { sensor_id, level };
            match self.bus.publish_to(Topic::LevelBroadcast, Event::new(SOURCE, payload)) {
                Ok(_) => delivered += 1,
                Err(e) => debug!(sensor_id, error = %e, "level broadcast not delivered"),
            }
        }
        if delivered < self.config.sensors_count {
            warn!(
                delivered,
                expected = self.config.sensors_count,
                "some sensors missed the level broadcast"
            );
        }

        info!(level = %level, "valve level confirmed");
        self.set_phase(Phase::Confirmed);
    }

    fn fail(&mut self, e: HeatError, phase: Phase) -> Result<ValveLevel, HeatError> {
        error!(error = %e, "unable to set valve level");
        self.failed_applications += 1;
        self.set_phase(phase);
        Err(e)
    }

    fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
        self.publish_status();
    }

    fn publish_status(&self) {
        self.status_tx.send_replace(ControllerStatus {
            phase: self.phase,
            cycle: self.cycle_state(),
            last_average: self.ledger.last(),
            ledger_len: self.ledger.len(),
            confirmed_cycles: self.confirmed_cycles,
            failed_applications: self.failed_applications,
        });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
