//! Error types for the dispatch layer.

use thiserror::Error;

use tether_protocol::RemoteError;

/// Errors surfaced by [`Endpoint::call`](crate::Endpoint::call).
///
/// A call never fails locally: everything except [`Closed`](Self::Closed)
/// originates on the remote side and crosses the boundary as a causal
/// message chain.
#[derive(Debug, Error)]
pub enum CallError {
    /// The remote handler failed, or the function was not registered
    /// there. Carries the reconstructed causal chain.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The endpoint was dropped before a result arrived.
    #[error("endpoint closed before a result arrived")]
    Closed,
}

impl CallError {
    /// The remote chain, when this is a remote failure.
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            Self::Remote(error) => Some(error),
            Self::Closed => None,
        }
    }
}
