use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Topic carrying outbound call requests.
pub const CALL_TOPIC: &str = "ipc:call";

/// Topic carrying results for previously issued calls.
pub const CALL_RESULT_TOPIC: &str = "ipc:call-result";

/// Topic carrying fire-and-forget event broadcasts.
pub const EVENT_TOPIC: &str = "ipc:event";

/// Correlation identifier for an in-flight call.
///
/// Ids are sampled uniformly from `0..=CallId::MAX` by the dispatcher.
/// The range is capped at 2^53 - 1 so a peer that parses JSON numbers as
/// IEEE doubles round-trips every id exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(u64);

impl CallId {
    /// Largest id value representable exactly by every peer.
    pub const MAX: u64 = (1 << 53) - 1;

    /// Wrap a raw id value.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw id value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Request for a named remote function to execute with the given arguments.
///
/// `args` and the eventual result are opaque pass-through values; the
/// dispatch layer never inspects them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    /// Correlation id echoed back in the matching [`CallResult`].
    pub id: CallId,
    /// Name of the remotely registered function.
    #[serde(rename = "fn")]
    pub function: String,
    /// Positional arguments, empty when absent on the wire.
    #[serde(default)]
    pub args: Vec<Value>,
}

impl CallRequest {
    pub fn new(id: CallId, function: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            id,
            function: function.into(),
            args,
        }
    }
}

/// Outcome of a call, routed back to the issuing side by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CallResult {
    /// The handler completed; `data` carries its return value, if any.
    Ok {
        id: CallId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    /// The handler failed (or the function was not registered); `error`
    /// carries the causal chain as messages, outermost first.
    Error {
        id: CallId,
        #[serde(default)]
        error: Vec<String>,
    },
}

impl CallResult {
    pub fn ok(id: CallId, data: Option<Value>) -> Self {
        Self::Ok { id, data }
    }

    pub fn error(id: CallId, chain: Vec<String>) -> Self {
        Self::Error { id, error: chain }
    }

    /// The id of the call this result answers.
    pub fn id(&self) -> CallId {
        match self {
            Self::Ok { id, .. } | Self::Error { id, .. } => *id,
        }
    }
}

/// Uncorrelated named broadcast with positional arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    /// Event name listeners are keyed by.
    pub event: String,
    /// Positional arguments, empty when absent on the wire.
    #[serde(default)]
    pub args: Vec<Value>,
}

impl EventMessage {
    pub fn new(event: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            event: event.into(),
            args,
        }
    }
}
