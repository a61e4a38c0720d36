//! Actuator acknowledgment listener.
//!
//! Runs as its own task so confirmations are picked off the bus even while
//! the control task is busy.  Results are handed to the control task
//! through a single-slot [`mpsc`] channel: at most one application is ever
//! outstanding, so one slot is enough.  A confirmation that arrives while
//! the slot is still occupied is dropped with a warning; the control task
//! drains leftovers before it publishes the next command.

use heatctl_middleware::{EventBus, ShutdownSignal, Topic, TopicReceiver};
use heatctl_types::{EventPayload, ValveLevel};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Capacity of the handoff channel.
const ACK_SLOTS: usize = 1;

/// What the actuator answered.
#[derive(Debug, Clone, PartialEq)]
pub enum Acknowledgment {
    Confirmed { level: ValveLevel },
    Rejected { level: ValveLevel, reason: String },
}

impl Acknowledgment {
    /// Convert a bus payload for `valve_id` into an acknowledgment.
    pub fn from_payload(payload: EventPayload, valve_id: &str) -> Option<Self> {
        match payload {
            EventPayload::ValveConfirmed { valve_id: id, level } if id == valve_id => {
                Some(Self::Confirmed { level })
            }
            EventPayload::ValveRejected {
                valve_id: id,
                level,
                reason,
            } if id == valve_id => Some(Self::Rejected { level, reason }),
            _ => None,
        }
    }
}

/// Subscribe to [`Topic::ValveConfirmations`] and spawn the listener task.
///
/// Returns the task handle and the receiving end of the handoff slot, which
/// belongs to the control task.
pub fn spawn_ack_listener(
    bus: &EventBus,
    valve_id: impl Into<String>,
    shutdown: ShutdownSignal,
) -> (JoinHandle<()>, mpsc::Receiver<Acknowledgment>) {
    let (tx, rx) = mpsc::channel(ACK_SLOTS);
    let confirmations = bus.subscribe_to(Topic::ValveConfirmations);
    let handle = tokio::spawn(listen(confirmations, valve_id.into(), tx, shutdown));
    (handle, rx)
}

async fn listen(
    mut confirmations: TopicReceiver,
    valve_id: String,
    slot: mpsc::Sender<Acknowledgment>,
    mut shutdown: ShutdownSignal,
) {
    info!(valve_id = %valve_id, "acknowledgment listener started");
    loop {
        let event = tokio::select! {
            _ = shutdown.wait() => break,
            received = confirmations.recv() => match received {
                Ok(event) => event,
                Err(RecvError::Lagged(n)) => {
                    warn!(lagged_by = n, "acknowledgment listener fell behind");
                    continue;
                }
                Err(RecvError::Closed) => break,
            },
        };

        let Some(ack) = Acknowledgment::from_payload(event.payload, &valve_id) else {
            continue;
        };
        debug!(ack = ?ack, source = %event.source, "acknowledgment received");

        match slot.try_send(ack) {
            Ok(()) => {}
            Err(TrySendError::Full(ack)) => {
                warn!(ack = ?ack, "no application outstanding, dropping acknowledgment");
            }
            Err(TrySendError::Closed(_)) => break,
        }
    }
    info!(valve_id = %valve_id, "acknowledgment listener stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use heatctl_middleware::shutdown;
    use heatctl_types::Event;
    use std::time::Duration;

    fn confirmed(valve_id: &str, level: u32) -> Event {
        Event::new(
            "test",
            EventPayload::ValveConfirmed {
                valve_id: valve_id.to_string(),
                level: ValveLevel::saturating(level),
            },
        )
    }

    #[test]
    fn from_payload_filters_by_valve() {
        let ack = Acknowledgment::from_payload(confirmed("room-1", 30).payload, "room-1");
        assert_eq!(ack, Some(Acknowledgment::Confirmed { level: ValveLevel::saturating(30) }));
        assert_eq!(Acknowledgment::from_payload(confirmed("room-2", 30).payload, "room-1"), None);
    }

    #[test]
    fn from_payload_maps_rejection() {
        let payload = EventPayload::ValveRejected {
            valve_id: "room-1".to_string(),
            level: ValveLevel::OPEN,
            reason: "stuck".to_string(),
        };
        assert_eq!(
            Acknowledgment::from_payload(payload, "room-1"),
            Some(Acknowledgment::Rejected {
                level: ValveLevel::OPEN,
                reason: "stuck".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn forwards_confirmation_into_slot() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let (trigger, signal) = shutdown::channel();
        let (handle, mut acks) = spawn_ack_listener(&bus, "room-1", signal);

        bus.publish_to(Topic::ValveConfirmations, confirmed("room-2", 10))?;
        bus.publish_to(Topic::ValveConfirmations, confirmed("room-1", 250))?;

        let ack = tokio::time::timeout(Duration::from_secs(1), acks.recv()).await?;
        assert_eq!(ack, Some(Acknowledgment::Confirmed { level: ValveLevel::OPEN }));

        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(1), handle).await??;
        Ok(())
    }

    #[tokio::test]
    async fn full_slot_drops_extra_acknowledgments() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let (_trigger, signal) = shutdown::channel();
        let (_handle, mut acks) = spawn_ack_listener(&bus, "room-1", signal);

        bus.publish_to(Topic::ValveConfirmations, confirmed("room-1", 10))?;
        bus.publish_to(Topic::ValveConfirmations, confirmed("room-1", 20))?;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(
            acks.try_recv()?,
            Acknowledgment::Confirmed { level: ValveLevel::saturating(10) }
        );
        assert!(acks.try_recv().is_err());
        Ok(())
    }
}
