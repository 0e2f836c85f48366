//! Event Hub
//!
//! Topic-keyed fan-out of dispatched events to in-process consumers.
//! Market data topics are `"<channel>:<symbol>"` (e.g. `"quotes:AAPL"`);
//! connection lifecycle events use the `"connection"` topic.
//!
//! Channels are created lazily on first publish or subscribe. Publishing
//! to a topic with no subscribers is a no-op; slow subscribers lag and
//! miss events rather than exerting backpressure on the pipeline.

use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::application::dispatch::OutboundEvent;

/// Topic carrying connection lifecycle events.
pub const CONNECTION_TOPIC: &str = "connection";

/// Default per-topic channel capacity.
pub const DEFAULT_TOPIC_CAPACITY: usize = 256;

/// Topic-keyed broadcast hub for outbound events.
#[derive(Debug)]
pub struct EventHub {
    topics: DashMap<String, broadcast::Sender<OutboundEvent>>,
    capacity: usize,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(DEFAULT_TOPIC_CAPACITY)
    }
}

impl EventHub {
    /// Create a hub with the given per-topic channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: DashMap::new(),
            capacity,
        }
    }

    /// Publish an event on its topic.
    ///
    /// Returns the number of subscribers that received the event, or
    /// `None` when the topic has no subscribers.
    pub fn publish(&self, event: OutboundEvent) -> Option<usize> {
        let topic = event.topic();
        let sender = self
            .topics
            .entry(topic)
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        sender.send(event).ok()
    }

    /// Subscribe to a topic.
    ///
    /// The subscription starts at the next published event; history is
    /// not replayed.
    #[must_use]
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<OutboundEvent> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Number of subscribers on a topic.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .get(topic)
            .map_or(0, |sender| sender.receiver_count())
    }

    /// Number of topics with a live channel.
    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }
}
