//! Host events: what the chat application tells the engine.
//!
//! Events are published by the host when something happens in the chat.
//! The runtime subscribes and decides which add-ons to run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All host events the engine reacts to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HostEvent {
    /// A chat was opened; persisted results should be restored
    ChatLoaded { timestamp: DateTime<Utc> },

    /// A new AI message finished rendering
    MessageReceived {
        message_index: usize,
        timestamp: DateTime<Utc>,
    },

    /// An AI message was regenerated or swiped to a new variant
    MessageRegenerated {
        message_index: usize,
        timestamp: DateTime<Utc>,
    },

    /// The user asked to run add-ons by hand (all enabled ones if `addon_ids` is empty)
    ManualTrigger {
        addon_ids: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// The user pressed Retry on an error indicator
    RetryRequested {
        addon_id: String,
        message_key: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for host events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<HostEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: HostEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<HostEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(HostEvent::MessageReceived {
            message_index: 3,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            HostEvent::MessageReceived { message_index, .. } => assert_eq!(*message_index, 3),
            _ => panic!("Expected MessageReceived event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(HostEvent::ChatLoaded {
            timestamp: Utc::now(),
        });
    }
}
