//! [`ValveDriver`] – the actuator end of the valve protocol.
//!
//! Listens on [`Topic::ValveCommands`], applies each command addressed to
//! its valve, and answers on [`Topic::ValveConfirmations`] with either
//! [`EventPayload::ValveConfirmed`] or [`EventPayload::ValveRejected`].
//! The answer is the only signal the controller waits for.

use std::time::Duration;

use heatctl_middleware::{EventBus, ShutdownSignal, Topic, TopicReceiver};
use heatctl_types::{Event, EventPayload, ValveLevel};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::valve::Valve;

/// Bridges bus commands to a [`Valve`] implementation.
pub struct ValveDriver {
    valve: Box<dyn Valve>,
    bus: EventBus,
    response_delay: Duration,
}

impl ValveDriver {
    pub fn new(valve: Box<dyn Valve>, bus: EventBus) -> Self {
        Self {
            valve,
            bus,
            response_delay: Duration::ZERO,
        }
    }

    /// Wait `delay` after applying each command before answering.  Used to
    /// simulate a sluggish actuator.
    pub fn with_response_delay(mut self, delay: Duration) -> Self {
        self.response_delay = delay;
        self
    }

    /// The wrapped valve.
    pub fn valve(&self) -> &dyn Valve {
        self.valve.as_ref()
    }

    /// Apply one command and build the reply.
    ///
    /// Returns `None` for anything that is not a level-set command for this
    /// valve.
    pub fn handle(&mut self, payload: &EventPayload) -> Option<EventPayload> {
        let EventPayload::SetValveLevel { valve_id, level } = payload else {
            return None;
        };
        if valve_id != self.valve.id() {
            debug!(valve_id = %valve_id, own_id = self.valve.id(), "ignoring command for another valve");
            return None;
        }

        let reply = match self.valve.set_level(*level) {
            Ok(()) => {
                info!(valve_id = %valve_id, level = %level, "valve level applied");
                EventPayload::ValveConfirmed {
                    valve_id: valve_id.clone(),
                    level: *level,
                }
            }
            Err(e) => {
                warn!(valve_id = %valve_id, level = %level, error = %e, "valve rejected level");
                EventPayload::ValveRejected {
                    valve_id: valve_id.clone(),
                    level: *level,
                    reason: e.to_string(),
                }
            }
        };
        Some(reply)
    }

    /// Subscribe to the command topic and run the driver on a new task.
    ///
    /// The subscription is taken before this returns, so no command
    /// published afterwards can be missed.
    pub fn spawn(self, shutdown: ShutdownSignal) -> JoinHandle<()> {
        let commands = self.bus.subscribe_to(Topic::ValveCommands);
        tokio::spawn(self.run(commands, shutdown))
    }

    async fn run(mut self, mut commands: TopicReceiver, mut shutdown: ShutdownSignal) {
        info!(valve_id = self.valve.id(), "valve driver started");
        loop {
            let event = tokio::select! {
                _ = shutdown.wait() => break,
                received = commands.recv() => match received {
                    Ok(event) => event,
                    Err(RecvError::Lagged(n)) => {
                        warn!(lagged_by = n, "valve driver fell behind on commands");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            };

            let Some(reply) = self.handle(&event.payload) else {
                continue;
            };

            if !self.response_delay.is_zero() {
                tokio::select! {
                    _ = shutdown.wait() => break,
                    _ = tokio::time::sleep(self.response_delay) => {}
                }
            }

            let source = format!("heatctl-hal::valve/{}", self.valve.id());
            if let Err(e) = self
                .bus
                .publish_to(Topic::ValveConfirmations, Event::new(source, reply))
            {
                warn!(error = %e, "no controller listening for valve confirmation");
            }
        }
        info!(
            valve_id = self.valve.id(),
            level = ?self.valve.level().map(ValveLevel::get),
            "valve driver stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimValve;
    use heatctl_middleware::shutdown;

    fn set_level(valve_id: &str, level: u32) -> EventPayload {
        EventPayload::SetValveLevel {
            valve_id: valve_id.to_string(),
            level: ValveLevel::saturating(level),
        }
    }

    #[test]
    fn handle_confirms_applied_level() {
        let mut driver = ValveDriver::new(Box::new(SimValve::new("room-1")), EventBus::default());
        let reply = driver.handle(&set_level("room-1", 75));
        assert_eq!(
            reply,
            Some(EventPayload::ValveConfirmed {
                valve_id: "room-1".to_string(),
                level: ValveLevel::saturating(75),
            })
        );
        assert_eq!(driver.valve().level(), Some(ValveLevel::saturating(75)));
    }

    #[test]
    fn handle_rejects_when_valve_faults() {
        let mut driver = ValveDriver::new(Box::new(SimValve::faulty("room-1")), EventBus::default());
        let reply = driver.handle(&set_level("room-1", 20));
        assert!(matches!(reply, Some(EventPayload::ValveRejected { ref reason, .. }) if reason.contains("stuck")));
        assert_eq!(driver.valve().level(), None);
    }

    #[test]
    fn handle_ignores_other_valves_and_payloads() {
        let mut driver = ValveDriver::new(Box::new(SimValve::new("room-1")), EventBus::default());
        assert_eq!(driver.handle(&set_level("room-2", 20)), None);
        assert_eq!(
            driver.handle(&EventPayload::LevelBroadcast {
                sensor_id: 0,
                level: ValveLevel::NEUTRAL,
            }),
            None
        );
        assert_eq!(driver.valve().level(), None);
    }

    #[tokio::test]
    async fn spawned_driver_answers_on_confirmation_topic() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut confirmations = bus.subscribe_to(Topic::ValveConfirmations);
        let (trigger, signal) = shutdown::channel();
        let handle = ValveDriver::new(Box::new(SimValve::new("room-1")), bus.clone()).spawn(signal);

        bus.publish_to(Topic::ValveCommands, Event::new("test", set_level("room-1", 40)))?;

        let event = tokio::time::timeout(Duration::from_secs(1), confirmations.recv()).await??;
        assert_eq!(
            event.payload,
            EventPayload::ValveConfirmed {
                valve_id: "room-1".to_string(),
                level: ValveLevel::saturating(40),
            }
        );

        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(1), handle).await??;
        Ok(())
    }
}
