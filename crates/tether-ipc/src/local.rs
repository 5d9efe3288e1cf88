//! In-process channel pair.
//!
//! [`LocalChannel::pair`] links two channel halves so that a publish on
//! one half is delivered synchronously to the subscribers of the other.
//! Useful for tests and for wiring two endpoints inside one process.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use serde_json::Value;

use crate::channel::{Channel, ChannelHandler};

type Subscriber = Arc<dyn Fn(Value) + Send + Sync>;

/// One half of a linked in-process channel.
///
/// Messages published here appear on the peer half; messages published
/// on the peer appear here. Delivery is synchronous and in publish
/// order. If the peer half has been dropped, publishes are discarded.
pub struct LocalChannel {
    subscribers: Mutex<HashMap<String, Vec<Subscriber>>>,
    peer: OnceLock<Weak<LocalChannel>>,
}

impl LocalChannel {
    /// Create two linked halves.
    pub fn pair() -> (Arc<LocalChannel>, Arc<LocalChannel>) {
        let left = Arc::new(Self::unlinked());
        let right = Arc::new(Self::unlinked());
        let _ = left.peer.set(Arc::downgrade(&right));
        let _ = right.peer.set(Arc::downgrade(&left));
        (left, right)
    }

    fn unlinked() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            peer: OnceLock::new(),
        }
    }

    fn deliver(&self, topic: &str, payload: Value) {
        // Snapshot the handlers so one may subscribe reentrantly without
        // deadlocking on the registry lock.
        let handlers: Vec<Subscriber> = {
            let subscribers = self.subscribers.lock();
            match subscribers.get(topic) {
                Some(handlers) => handlers.clone(),
                None => return,
            }
        };
        for handler in handlers {
            handler(payload.clone());
        }
    }
}

impl Channel for LocalChannel {
    fn subscribe(&self, topic: &str, handler: ChannelHandler) {
        self.subscribers
            .lock()
            .entry(topic.to_string())
            .or_default()
            .push(Arc::from(handler));
    }

    fn publish(&self, topic: &str, payload: Value) {
        match self.peer.get().and_then(Weak::upgrade) {
            Some(peer) => peer.deliver(topic, payload),
            None => tracing::debug!("Discarding publish on {:?}: peer half is gone", topic),
        }
    }
}
