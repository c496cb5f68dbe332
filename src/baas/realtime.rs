use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

/// One message delivered on a realtime channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RealtimeEvent {
    pub channel: String,
    /// Fully qualified event names, e.g. `databases.main.collections.posts.documents.<id>.create`.
    pub events: Vec<String>,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

struct Subscriber {
    tx: mpsc::Sender<RealtimeEvent>,
}

/// In-process pub/sub hub keyed by channel name.
///
/// A subscriber sees a disconnect as the end of its stream: `Subscription::recv`
/// returns `None` once the hub drops its sender.
#[derive(Clone)]
pub struct Realtime {
    channels: Arc<DashMap<String, DashMap<Uuid, Subscriber>>>,
    buffer: usize,
}

impl Default for Realtime {
    fn default() -> Self {
        Self::new(64)
    }
}

impl Realtime {
    pub fn new(buffer: usize) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            buffer: buffer.max(1),
        }
    }

    pub fn subscribe(&self, channel: &str) -> Subscription {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = Uuid::now_v7();
        self.channels
            .entry(channel.to_owned())
            .or_default()
            .insert(id, Subscriber { tx });
        debug!(%channel, %id, "subscribed");

        Subscription {
            id,
            channel: channel.to_owned(),
            rx,
            hub: self.clone(),
        }
    }

    /// Deliver an event to every live subscriber of `channel`. Returns how many received it.
    pub fn publish(&self, channel: &str, events: Vec<String>, payload: serde_json::Value) -> usize {
        let Some(subs) = self.channels.get(channel) else {
            return 0;
        };

        let event = RealtimeEvent {
            channel: channel.to_owned(),
            events,
            payload,
            timestamp: Utc::now(),
        };

        let mut delivered = 0;
        let mut closed = Vec::new();
        for sub in subs.iter() {
            match sub.tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(%channel, id = %sub.key(), "subscriber lagging, event dropped")
                }
                Err(TrySendError::Closed(_)) => closed.push(*sub.key()),
            }
        }
        for id in closed {
            subs.remove(&id);
        }

        delivered
    }

    /// Drop every subscriber of `channel`, as a transport disconnect would.
    pub fn disconnect(&self, channel: &str) -> usize {
        match self.channels.remove(channel) {
            Some((_, subs)) => {
                debug!(%channel, count = subs.len(), "disconnecting subscribers");
                subs.len()
            }
            None => 0,
        }
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels.get(channel).map(|s| s.len()).unwrap_or(0)
    }

    fn unsubscribe(&self, channel: &str, id: &Uuid) {
        if let Some(subs) = self.channels.get(channel) {
            if subs.remove(id).is_some() {
                debug!(%channel, %id, "unsubscribed");
            }
        }
        self.channels.remove_if(channel, |_, subs| subs.is_empty());
    }
}

/// Handle for one subscriber. Dropping it unsubscribes.
pub struct Subscription {
    pub id: Uuid,
    pub channel: String,
    rx: mpsc::Receiver<RealtimeEvent>,
    hub: Realtime,
}

impl Subscription {
    /// Next event, or `None` when the channel was disconnected.
    pub async fn recv(&mut self) -> Option<RealtimeEvent> {
        self.rx.recv().await
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(&self.channel, &self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn publish_reaches_all_subscribers() {
        let hub = Realtime::new(8);
        let mut a = hub.subscribe("posts");
        let mut b = hub.subscribe("posts");
        let _other = hub.subscribe("users");

        let n = hub.publish("posts", vec!["posts.create".into()], json!({ "id": 1 }));
        assert_eq!(n, 2);

        assert_eq!(a.recv().await.unwrap().payload, json!({ "id": 1 }));
        assert_eq!(b.recv().await.unwrap().events, vec!["posts.create".to_string()]);
    }

    #[tokio::test]
    async fn dropping_subscription_unsubscribes() {
        let hub = Realtime::default();
        let sub = hub.subscribe("posts");
        assert_eq!(hub.subscriber_count("posts"), 1);

        sub.unsubscribe();
        assert_eq!(hub.subscriber_count("posts"), 0);
        assert_eq!(hub.publish("posts", vec![], json!(null)), 0);
    }

    #[tokio::test]
    async fn disconnect_ends_stream_after_buffered_events() {
        let hub = Realtime::default();
        let mut sub = hub.subscribe("posts");
        hub.publish("posts", vec![], json!(1));

        assert_eq!(hub.disconnect("posts"), 1);
        assert_eq!(sub.recv().await.unwrap().payload, json!(1));
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn full_buffer_drops_instead_of_blocking() {
        let hub = Realtime::new(1);
        let _sub = hub.subscribe("posts");
        assert_eq!(hub.publish("posts", vec![], json!(1)), 1);
        assert_eq!(hub.publish("posts", vec![], json!(2)), 0);
    }
}
