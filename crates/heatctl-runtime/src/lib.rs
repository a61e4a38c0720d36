//! `heatctl-runtime` – the heating control loop.
//!
//! Turns per-sensor temperature readings into valve levels:
//!
//! - [`aggregator`] – [`Aggregator`]: one slot per sensor, completes a cycle
//!   once every sensor has reported, averages it to one decimal.
//! - [`decision`] – [`DecisionEngine`]: pure mapping from the cycle average
//!   and the previous level to the next level.
//! - [`controller`] – [`Controller`]: the single control task.  Owns the
//!   cache, the current level and the [`DecisionLedger`], applies levels to
//!   the valve and broadcasts confirmed levels back to the sensors.
//! - [`ack`] – the acknowledgment listener feeding actuator replies to the
//!   controller.
//! - [`ledger`] – [`DecisionLedger`]: history of cycle averages.
//! - [`telemetry`] – [`init_tracing`]: subscriber and optional OTLP export.

pub mod ack;
pub mod aggregator;
pub mod controller;
pub mod decision;
pub mod ledger;
pub mod telemetry;

pub use ack::{Acknowledgment, spawn_ack_listener};
pub use aggregator::Aggregator;
pub use controller::{
    Controller, ControllerConfig, ControllerHandles, ControllerReport, ControllerStatus,
    CycleState, Phase, ReadingOutcome,
};
pub use decision::DecisionEngine;
pub use ledger::DecisionLedger;
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
