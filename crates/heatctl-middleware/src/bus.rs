//! Headless, typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.
//!
//! # Topics
//!
//! Traffic is partitioned into four [`Topic`] lanes so components only
//! receive the messages they care about:
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::Readings`] | Sensor temperature readings for the controller |
//! | [`Topic::ValveCommands`] | Level-set commands for the valve actuator |
//! | [`Topic::ValveConfirmations`] | Actuator confirmations and rejections |
//! | [`Topic::LevelBroadcast`] | New valve level, one message per sensor |

use heatctl_types::{Event, HeatError};
use tokio::sync::broadcast;
use tracing::trace;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Enumeration of all routing topics on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Sensor → controller temperature readings.
    Readings,
    /// Controller → actuator level-set commands.
    ValveCommands,
    /// Actuator → controller confirmations (success or rejection).
    ValveConfirmations,
    /// Controller → sensors level notifications.
    LevelBroadcast,
}

impl Topic {
    /// Logical channel name, used in log fields.
    pub fn name(self) -> &'static str {
        match self {
            Topic::Readings => "/readings/temperature",
            Topic::ValveCommands => "/actuators/valve",
            Topic::ValveConfirmations => "/actuators/valve/confirmed",
            Topic::LevelBroadcast => "/sensors/valve-level",
        }
    }
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    readings: broadcast::Sender<Event>,
    valve_commands: broadcast::Sender<Event>,
    valve_confirmations: broadcast::Sender<Event>,
    level_broadcast: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every topic channel independently.
    pub fn new(capacity: usize) -> Self {
        let (readings, _) = broadcast::channel(capacity);
        let (valve_commands, _) = broadcast::channel(capacity);
        let (valve_confirmations, _) = broadcast::channel(capacity);
        let (level_broadcast, _) = broadcast::channel(capacity);
        Self {
            readings,
            valve_commands,
            valve_confirmations,
            level_broadcast,
        }
    }

    /// Publish `event` to the given [`Topic`] channel.
    ///
    /// Returns the number of active receivers that were handed the event, or
    /// [`HeatError::Channel`] when nobody is subscribed to the topic.
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, HeatError> {
        trace!(topic = topic.name(), source = %event.source, "publish");
        self.topic_sender(topic)
            .send(event)
            .map_err(|_| HeatError::Channel(format!("No subscribers for topic {}", topic.name())))
    }

    /// Subscribe to a specific [`Topic`] channel.
    ///
    /// The returned [`TopicReceiver`] yields only events published to that
    /// topic after this call.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    /// Number of live subscribers on `topic`.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topic_sender(topic).receiver_count()
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Readings => &self.readings,
            Topic::ValveCommands => &self.valve_commands,
            Topic::ValveConfirmations => &self.valve_confirmations,
            Topic::LevelBroadcast => &self.level_broadcast,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// An async receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(broadcast::error::RecvError::Lagged(n))` – the subscriber fell
    ///   behind and `n` messages were dropped.  The caller decides whether to
    ///   continue or abort.
    /// * `Err(broadcast::error::RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Non-blocking variant of [`recv`][Self::recv].
    pub fn try_recv(&mut self) -> Result<Event, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heatctl_types::{EventPayload, TemperatureReading};
    use std::time::Duration;

    fn make_event(source: &str) -> Event {
        Event::new(
            source,
            EventPayload::Reading(TemperatureReading::temperature(0, 21.0)),
        )
    }

    #[test]
    fn publish_no_subscribers_returns_error() {
        let bus = EventBus::default();
        let result = bus.publish_to(Topic::Readings, make_event("test"));
        assert!(matches!(result, Err(HeatError::Channel(_))));
    }

    #[tokio::test]
    async fn publish_and_receive() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut rx = bus.subscribe_to(Topic::Readings);

        let event = make_event("heatctl-hal::sensor-0");
        assert_eq!(bus.publish_to(Topic::Readings, event.clone())?, 1);

        let received = rx.recv().await?;
        assert_eq!(received.id, event.id);
        assert_eq!(received.source, event.source);
        assert_eq!(rx.topic(), Topic::Readings);
        Ok(())
    }

    /// Two independent subscribers on the same topic both receive the event.
    #[tokio::test]
    async fn topic_multiple_subscribers_receive_same_event() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut subscriber1 = bus.subscribe_to(Topic::LevelBroadcast);
        let mut subscriber2 = bus.subscribe_to(Topic::LevelBroadcast);
        assert_eq!(bus.subscriber_count(Topic::LevelBroadcast), 2);

        let event = make_event("heatctl-runtime::controller");
        bus.publish_to(Topic::LevelBroadcast, event.clone())?;

        assert_eq!(subscriber1.recv().await?.id, event.id);
        assert_eq!(subscriber2.recv().await?.id, event.id);
        Ok(())
    }

    /// A subscriber on `ValveConfirmations` must not receive events published
    /// to `ValveCommands` because they are routed through separate channels.
    #[tokio::test]
    async fn topic_subscriber_does_not_receive_other_topic_events() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut confirmations = bus.subscribe_to(Topic::ValveConfirmations);
        let _commands = bus.subscribe_to(Topic::ValveCommands);

        bus.publish_to(Topic::ValveCommands, make_event("controller"))?;

        let result = tokio::time::timeout(Duration::from_millis(50), confirmations.recv()).await;
        assert!(
            result.is_err(),
            "ValveConfirmations subscriber must not receive a ValveCommands event"
        );
        Ok(())
    }

    #[test]
    fn try_recv_is_empty_before_publish() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe_to(Topic::ValveConfirmations);
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    /// Flooding a low-capacity channel while a subscriber sleeps must produce
    /// a `Lagged` error rather than panicking or blocking.
    #[tokio::test]
    async fn topic_channel_lag_on_slow_subscriber() {
        let bus = EventBus::new(8);
        let mut slow_sub = bus.subscribe_to(Topic::Readings);

        for _ in 0..100 {
            let _ = bus.publish_to(Topic::Readings, make_event("flood"));
        }

        let result = slow_sub.recv().await;
        assert!(
            matches!(result, Err(broadcast::error::RecvError::Lagged(_))),
            "expected Lagged error, got: {result:?}"
        );
    }
}
