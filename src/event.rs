//! Daemon event channel.
//!
//! Managers publish per-device failures here instead of propagating them out
//! of their workers.

use log::trace;
use tokio::sync::broadcast;

use crate::devices::DeviceId;

/// Which control loop produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loop {
    Fan,
    Lighting,
}

impl Loop {
    pub const fn as_str(self) -> &'static str {
        match self {
            Loop::Fan => "fan",
            Loop::Lighting => "lighting",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A command for `device` failed during a tick of `source`.
    DeviceWriteFailed {
        source: Loop,
        device: DeviceId,
        reason: String,
    },
    /// The strategy of `source` could not produce a value for `device`.
    StrategyFailed {
        source: Loop,
        device: DeviceId,
        reason: String,
    },
    /// A full tick of `source` finished; `failures` devices could not be served.
    TickCompleted { source: Loop, tick: u64, failures: usize },
    /// Periodic liveness signal from the daemon supervisor.
    Heartbeat { devices: usize },
}

/// Publish-subscribe channel shared by the daemon and its managers.
///
/// # Example
///
/// ```no_run
/// use tt_rgbd::event::{Event, EventBus, Loop};
///
/// let event_bus = EventBus::new();
/// let mut subscriber = event_bus.subscribe();
///
/// event_bus.publish(Event::TickCompleted { source: Loop::Fan, tick: 0, failures: 0 });
/// // let event = subscriber.recv().await;
/// ```
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }

    #[cfg(test)]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all current subscribers. With nobody
    /// listening the event is dropped.
    pub fn publish(&self, event: Event) {
        if let Err(broadcast::error::SendError(event)) = self.sender.send(event) {
            trace!("No subscribers for {event:?}");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn failure(device: u8) -> Event {
        Event::DeviceWriteFailed {
            source: Loop::Fan,
            device: DeviceId::new(device),
            reason: "nack".into(),
        }
    }

    #[test]
    fn clone_shares_channel() {
        let bus1 = EventBus::new();
        let bus2 = bus1.clone();

        let _r1 = bus1.subscribe();
        let _r2 = bus2.subscribe();

        assert_eq!(bus1.sender.receiver_count(), 2);
    }

    #[tokio::test]
    async fn subscribers_receive_in_publication_order() {
        let bus = EventBus::with_capacity(8);
        let mut receiver = bus.subscribe();

        bus.publish(failure(1));
        bus.publish(Event::TickCompleted {
            source: Loop::Lighting,
            tick: 3,
            failures: 0,
        });

        assert_eq!(receiver.recv().await.unwrap(), failure(1));
        assert_eq!(
            receiver.recv().await.unwrap(),
            Event::TickCompleted {
                source: Loop::Lighting,
                tick: 3,
                failures: 0
            }
        );
    }

    #[tokio::test]
    async fn events_published_with_nobody_listening_are_dropped() {
        let bus = EventBus::new();
        bus.publish(failure(2));

        let mut receiver = bus.subscribe();
        bus.publish(failure(3));
        assert_eq!(receiver.recv().await.unwrap(), failure(3));
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn late_subscriber_only_sees_new_events() {
        let bus = EventBus::new();
        let mut early = bus.subscribe();
        bus.publish(failure(1));
        let _ = early.recv().await.unwrap();

        let mut late = bus.subscribe();
        bus.publish(failure(2));
        assert_eq!(late.recv().await.unwrap(), failure(2));
    }
}
