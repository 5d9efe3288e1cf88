//! Wire protocol shared by both sides of a tether channel.
//!
//! Defines the three message shapes that cross the channel boundary
//! (call requests, call results, events), the topics they travel on,
//! and the codec that carries causal error chains across the boundary
//! as plain message strings.

mod error;
mod protocol;

pub use error::{pack, unpack, RemoteError, UNKNOWN_ERROR};
pub use protocol::{
    CallId, CallRequest, CallResult, EventMessage, CALL_RESULT_TOPIC, CALL_TOPIC, EVENT_TOPIC,
};
