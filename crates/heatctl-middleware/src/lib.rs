//! `heatctl-middleware` – the message bus
//!
//! Routes readings, valve commands, confirmations and level broadcasts
//! between sensors, the controller and the valve actuator without caring
//! about their meaning.
//!
//! # Modules
//!
//! - [`bus`] – Headless, typed, topic-based publish/subscribe event bus built
//!   on Tokio broadcast channels.
//! - [`shutdown`] – cooperative stop signal fanned out to every task.

pub mod bus;
pub mod shutdown;

pub use bus::{EventBus, Topic, TopicReceiver};
pub use shutdown::{ShutdownSignal, ShutdownTrigger};
