//! # Tether IPC - bidirectional calls and events over one channel
//!
//! This crate implements the correlation and dispatch layer between two
//! isolated execution contexts (for example a host process and an
//! embedded runtime it hosts), multiplexed over a single topic-based
//! message channel. One side invokes named asynchronous functions
//! registered on the other and receives the result or a causally
//! chained error; either side broadcasts named events to any number of
//! listeners on the other side.
//!
//! ## Module Organization
//!
//! - `channel`: the transport abstraction the endpoint is wired to
//! - `endpoint`: call dispatcher and event broadcaster
//! - `local`: in-process channel pair for tests and same-process wiring
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tether_ipc::{Endpoint, LocalChannel};
//!
//! let (host_side, guest_side) = LocalChannel::pair();
//! let host = Endpoint::new(host_side);
//! let guest = Endpoint::new(guest_side);
//!
//! guest.register("status", |_args| async move { Ok(json!("ready")) });
//! let status = host.call("status", vec![]).await?;
//! ```

pub mod channel;
pub mod endpoint;
pub mod local;

mod error;

pub use channel::{Channel, ChannelHandler};
pub use endpoint::{CallHandler, Endpoint, EventListener};
pub use error::CallError;
pub use local::LocalChannel;

// Wire-level types, re-exported for callers that build or inspect
// protocol messages directly.
pub use tether_protocol as protocol;
pub use tether_protocol::{pack, unpack, RemoteError};
