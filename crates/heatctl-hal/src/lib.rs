//! `heatctl-hal` – valve and sensor hardware layer
//!
//! Everything that sits on the far side of the bus from the controller.
//!
//! # Modules
//!
//! - [`valve`] – the [`Valve`][valve::Valve] actuator trait.
//! - [`sim`] – [`SimValve`][sim::SimValve], an in-process valve for headless
//!   runs and tests.
//! - [`driver`] – [`ValveDriver`][driver::ValveDriver]: applies level-set
//!   commands from the bus and answers with confirmations.
//! - [`sensor`] – [`SensorSim`][sensor::SensorSim], simulated room sensors
//!   that react to valve-level broadcasts through a fixed response table.

pub mod driver;
pub mod sensor;
pub mod sim;
pub mod valve;

pub use driver::ValveDriver;
pub use sensor::{SensorSettings, SensorSim, temperature_change_percent};
pub use sim::SimValve;
pub use valve::Valve;
