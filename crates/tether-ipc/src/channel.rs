//! Transport abstraction.
//!
//! The endpoint never talks to the outside world directly; it publishes
//! and subscribes on a [`Channel`], and the surrounding application
//! decides how messages actually cross the process or runtime boundary.

use serde_json::Value;

/// Handler invoked for every inbound message on a subscribed topic.
pub type ChannelHandler = Box<dyn Fn(Value) + Send + Sync>;

/// Topic-based publish/subscribe transport connecting the two sides.
///
/// Delivery ordering and reliability are whatever the implementation
/// provides; the dispatch layer imposes nothing on top. The endpoint
/// subscribes exactly once per protocol topic.
pub trait Channel: Send + Sync {
    /// Register a handler for inbound messages on `topic`.
    fn subscribe(&self, topic: &str, handler: ChannelHandler);

    /// Send a message to the other side.
    ///
    /// Fire and forget: the channel applies its own buffering policy and
    /// reports no delivery outcome.
    fn publish(&self, topic: &str, payload: Value);
}
