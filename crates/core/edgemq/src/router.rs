//! Local subscription fan-out: the `broker_engine::LocalRouter` +
//! `device_cache::SessionHandle` the MQTT listener registers into the
//! engine and the Device Cache at connect/subscribe time.
//!
//! Grounded on `topic_grammar::TopicFilter::accept_topic`, itself a thin
//! wrapper over `rumqttc::matches` — the same wildcard matcher already used
//! by the rest of this workspace.

use std::collections::HashMap;
use std::sync::Arc;

use broker_engine::LocalRouter;
use device_cache::SessionHandle;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use topic_grammar::Topic;
use topic_grammar::TopicFilter;
use tracing::warn;

/// A message queued for delivery to one connected socket.
pub enum OutboundEvent {
    Publish { topic: String, payload: Vec<u8> },
    Close,
}

struct Subscriber {
    filters: Vec<String>,
    tx: mpsc::UnboundedSender<OutboundEvent>,
}

/// Registry of live sessions and their subscribed topic filters, shared
/// between every connection task (`spec.md` §5, "Device Cache is the
/// canonical shared structure" — this is its MQTT-listener-local twin for
/// subscriptions, which are inherently a property of one socket).
#[derive(Default)]
pub struct SubscriptionRegistry {
    subscribers: RwLock<HashMap<String, Subscriber>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        SubscriptionRegistry::default()
    }

    pub fn register(&self, client_id: &str, tx: mpsc::UnboundedSender<OutboundEvent>) {
        self.subscribers.write().insert(
            client_id.to_string(),
            Subscriber {
                filters: Vec::new(),
                tx,
            },
        );
    }

    pub fn subscribe(&self, client_id: &str, pattern: &str) {
        if let Some(sub) = self.subscribers.write().get_mut(client_id) {
            sub.filters.push(pattern.to_string());
        }
    }

    pub fn unsubscribe(&self, client_id: &str, pattern: &str) {
        if let Some(sub) = self.subscribers.write().get_mut(client_id) {
            sub.filters.retain(|p| p != pattern);
        }
    }

    pub fn remove(&self, client_id: &str) {
        self.subscribers.write().remove(client_id);
    }
}

impl LocalRouter for SubscriptionRegistry {
    fn publish_local(&self, topic: &str, payload: &[u8]) {
        let topic_obj = Topic::new_unchecked(topic);
        let subscribers = self.subscribers.read();
        for sub in subscribers.values() {
            let matches = sub.filters.iter().any(|pattern| {
                TopicFilter::new_unchecked(pattern).accept_topic(&topic_obj)
            });
            if matches {
                let event = OutboundEvent::Publish {
                    topic: topic.to_string(),
                    payload: payload.to_vec(),
                };
                if sub.tx.send(event).is_err() {
                    warn!(topic, "failed to queue message for a subscriber whose connection already closed");
                }
            }
        }
    }
}

/// The `SessionHandle` registered with the Device Cache at connect time, so
/// that a size/rate/ACL violation anywhere in the engine can force this
/// socket closed (`spec.md` §4.4).
pub struct ConnectionHandle {
    tx: mpsc::UnboundedSender<OutboundEvent>,
}

impl ConnectionHandle {
    pub fn new(tx: mpsc::UnboundedSender<OutboundEvent>) -> Arc<ConnectionHandle> {
        Arc::new(ConnectionHandle { tx })
    }
}

impl SessionHandle for ConnectionHandle {
    fn close(&self) {
        let _ = self.tx.send(OutboundEvent::Close);
    }
}
