use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

/// Topic-keyed fan-out of JSON text frames to WebSocket clients.
///
/// Topics are created lazily on first subscribe. Publishing to a topic with
/// no subscribers is a no-op. Clone-able via internal Arc.
#[derive(Clone, Default)]
pub struct BroadcastHub {
    channels: Arc<RwLock<HashMap<String, broadcast::Sender<String>>>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a topic.  Creates the channel if it doesn't exist.
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<String> {
        {
            let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(tx) = channels.get(topic) {
                return tx.subscribe();
            }
        }

        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        channels
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publish a message to a topic and return receiver count.
    pub fn publish(&self, topic: &str, message: String) -> usize {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        channels
            .get(topic)
            .and_then(|tx| tx.send(message).ok())
            .unwrap_or(0)
    }

    /// Serialize `value` and publish it. Serialization failures are dropped.
    pub fn publish_json<T: Serialize>(&self, topic: &str, value: &T) -> usize {
        match serde_json::to_string(value) {
            Ok(text) => self.publish(topic, text),
            Err(e) => {
                tracing::warn!(topic, error = %e, "dropping unserializable message");
                0
            }
        }
    }

    /// Forget a topic once nothing more will be published on it.
    /// Current subscribers see the channel close.
    pub fn close_topic(&self, topic: &str) {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        channels.remove(topic);
    }

    #[cfg(test)]
    pub fn topic_count(&self) -> usize {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::RecvError;

    #[tokio::test]
    async fn subscribers_receive_published_json() {
        let hub = BroadcastHub::new();
        let mut a = hub.subscribe("optimize:1");
        let mut b = hub.subscribe("optimize:1");

        let sent = hub.publish_json("optimize:1", &serde_json::json!({"type": "run_started"}));
        assert_eq!(sent, 2);
        assert_eq!(a.recv().await.unwrap(), r#"{"type":"run_started"}"#);
        assert_eq!(b.recv().await.unwrap(), r#"{"type":"run_started"}"#);
    }

    #[test]
    fn publish_without_subscribers_is_noop() {
        let hub = BroadcastHub::new();
        assert_eq!(hub.publish("optimize:none", "x".into()), 0);
        assert_eq!(hub.topic_count(), 0);
    }

    #[tokio::test]
    async fn closing_topic_ends_subscriptions() {
        let hub = BroadcastHub::new();
        let mut rx = hub.subscribe("optimize:2");
        hub.close_topic("optimize:2");
        assert_eq!(hub.topic_count(), 0);
        assert!(matches!(rx.recv().await, Err(RecvError::Closed)));
    }
}
