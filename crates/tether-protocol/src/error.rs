//! Causal error chains across the channel boundary.
//!
//! Errors cross the channel as an ordered list of message strings,
//! outermost first. [`pack`] flattens a local `source()` chain into that
//! list; [`unpack`] rebuilds a [`RemoteError`] chain from it. Type
//! identity and stack information are not preserved, only messages.

use std::error::Error as StdError;
use std::fmt;

/// Placeholder message for failures that carry no usable message.
pub const UNKNOWN_ERROR: &str = "Unknown Error";

/// An error reconstructed from a remote causal chain.
///
/// The chain is an explicit linked structure: each error holds its
/// message and an optional boxed cause. `source()` walks the chain, so
/// reconstructed errors compose with `anyhow` and error-report helpers
/// like any other `std::error::Error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    message: String,
    cause: Option<Box<RemoteError>>,
}

impl RemoteError {
    /// Create a chain of depth one.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    /// Create an error caused by an existing chain.
    pub fn with_cause(message: impl Into<String>, cause: RemoteError) -> Self {
        Self {
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }

    /// The message of this link in the chain.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The underlying cause, if any.
    pub fn cause(&self) -> Option<&RemoteError> {
        self.cause.as_deref()
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for RemoteError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause.as_deref().map(|cause| cause as &(dyn StdError + 'static))
    }
}

/// Flatten an error's causal chain into messages, outermost first.
///
/// Walks the error, then its `source()`, then that source's source,
/// appending each `Display` rendering until no further cause exists.
pub fn pack(error: &(dyn StdError + 'static)) -> Vec<String> {
    let mut messages = vec![error.to_string()];
    let mut source = error.source();
    while let Some(cause) = source {
        messages.push(cause.to_string());
        source = cause.source();
    }
    messages
}

/// Rebuild a [`RemoteError`] chain from messages, outermost first.
///
/// Builds from the innermost message outward, wrapping each preceding
/// message around the previously built error as its cause, so the
/// result reproduces the original nesting order. An empty list yields a
/// single [`UNKNOWN_ERROR`] link (the wire `error` field is optional).
pub fn unpack(messages: &[String]) -> RemoteError {
    let mut iter = messages.iter().rev();
    let innermost = match iter.next() {
        Some(message) => RemoteError::new(message.clone()),
        None => return RemoteError::new(UNKNOWN_ERROR),
    };
    iter.fold(innermost, |cause, message| {
        RemoteError::with_cause(message.clone(), cause)
    })
}
