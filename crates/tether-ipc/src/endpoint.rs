//! The endpoint: call dispatch and event broadcast over one channel.
//!
//! An [`Endpoint`] is one side's instance of the protocol. It owns the
//! three registries (call handlers, event listeners, pending calls) and
//! the correlation id generator, all tied to the lifetime of the channel
//! it was constructed with.
//!
//! ## Responsibilities
//!
//! - Outbound `call()`: allocate an id, record the completion pair,
//!   publish the request, settle the returned future when the matching
//!   result arrives.
//! - Inbound call requests: route to the locally registered handler and
//!   publish its outcome, or synthesize an unknown-function error.
//! - Inbound call results: route back to the waiting caller by id.
//! - Inbound events: broadcast to listeners in registration order.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use rand::RngExt;
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinError;

use tether_protocol::{
    unpack, CallId, CallRequest, CallResult, EventMessage, RemoteError, CALL_RESULT_TOPIC,
    CALL_TOPIC, EVENT_TOPIC, UNKNOWN_ERROR,
};

use crate::channel::Channel;
use crate::error::CallError;

/// Type-erased asynchronous call handler.
///
/// Takes the positional argument list and resolves to the call's return
/// value or a failure whose causal chain is sent back to the caller.
pub type CallHandler =
    Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Event listener invoked with the broadcast argument list.
pub type EventListener = Arc<dyn Fn(&[Value]) + Send + Sync>;

type PendingSender = oneshot::Sender<Result<Value, RemoteError>>;

/// One side of a bidirectional call/event connection.
///
/// Construct with the channel linking the two sides; the endpoint
/// subscribes once to each protocol topic. All registries are owned by
/// the endpoint instance, not by the process.
///
/// # Example
///
/// ```
/// use serde_json::{json, Value};
/// use tether_ipc::{Endpoint, LocalChannel};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let (host_side, guest_side) = LocalChannel::pair();
/// let host = Endpoint::new(host_side);
/// let guest = Endpoint::new(guest_side);
///
/// guest.register("greet", |args: Vec<Value>| async move {
///     let name = args.first().and_then(Value::as_str).unwrap_or("world");
///     Ok(json!(format!("hello {name}")))
/// });
///
/// let reply = host.call("greet", vec![json!("tether")]).await.unwrap();
/// assert_eq!(reply, json!("hello tether"));
/// # }
/// ```
pub struct Endpoint {
    inner: Arc<Inner>,
}

struct Inner {
    channel: Arc<dyn Channel>,
    runtime: Handle,
    call_handlers: Mutex<HashMap<String, CallHandler>>,
    event_listeners: Mutex<HashMap<String, Vec<EventListener>>>,
    pending: Mutex<HashMap<CallId, PendingSender>>,
}

impl Endpoint {
    /// Create an endpoint bound to `channel` and subscribe the protocol
    /// topics.
    ///
    /// The current Tokio runtime handle is captured here; inbound call
    /// handlers run as tasks on that runtime regardless of which thread
    /// the channel delivers messages from.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime context.
    pub fn new(channel: Arc<dyn Channel>) -> Self {
        let inner = Arc::new(Inner {
            channel: Arc::clone(&channel),
            runtime: Handle::current(),
            call_handlers: Mutex::new(HashMap::new()),
            event_listeners: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
        });

        // Subscriptions hold weak references: the channel may outlive the
        // endpoint, and messages delivered after drop become no-ops.
        let weak = Arc::downgrade(&inner);
        channel.subscribe(
            CALL_TOPIC,
            Box::new({
                let weak = Weak::clone(&weak);
                move |payload| {
                    if let Some(inner) = weak.upgrade() {
                        Inner::on_call_request(&inner, payload);
                    }
                }
            }),
        );
        channel.subscribe(
            CALL_RESULT_TOPIC,
            Box::new({
                let weak = Weak::clone(&weak);
                move |payload| {
                    if let Some(inner) = weak.upgrade() {
                        inner.on_call_result(payload);
                    }
                }
            }),
        );
        channel.subscribe(
            EVENT_TOPIC,
            Box::new(move |payload| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_event(payload);
                }
            }),
        );

        Self { inner }
    }

    /// Invoke a remotely registered function.
    ///
    /// Publishes the request immediately and returns a future that
    /// settles only when the matching result arrives. There is no
    /// timeout: if the remote side never answers, the future never
    /// settles (unless the endpoint itself is dropped, which fails all
    /// outstanding calls with [`CallError::Closed`]).
    ///
    /// # Errors
    ///
    /// - [`CallError::Remote`] when the remote handler fails or the
    ///   function is not registered on the other side.
    /// - [`CallError::Closed`] when the endpoint is dropped while the
    ///   call is outstanding.
    pub fn call(
        &self,
        function: &str,
        args: Vec<Value>,
    ) -> impl Future<Output = Result<Value, CallError>> + Send + 'static {
        let (sender, receiver) = oneshot::channel();
        let id = self.inner.track_pending(sender);
        let request = CallRequest::new(id, function, args);
        self.inner.publish(CALL_TOPIC, &request);

        async move {
            match receiver.await {
                Ok(Ok(data)) => Ok(data),
                Ok(Err(chain)) => Err(CallError::Remote(chain)),
                Err(_) => Err(CallError::Closed),
            }
        }
    }

    /// Broadcast an event to the other side.
    ///
    /// Fire and forget: no acknowledgment, no correlation, and no
    /// delivery guarantee beyond what the channel provides.
    pub fn emit(&self, event: &str, args: Vec<Value>) {
        let message = EventMessage::new(event, args);
        self.inner.publish(EVENT_TOPIC, &message);
    }

    /// Register a handler for a named function.
    ///
    /// Registering under an existing name replaces the prior handler.
    pub fn register<F, Fut>(&self, function: &str, handler: F)
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        let handler: CallHandler = Arc::new(move |args| handler(args).boxed());
        self.inner
            .call_handlers
            .lock()
            .insert(function.to_string(), handler);
    }

    /// Append a listener for a named event.
    ///
    /// Listeners run in registration order; there is no de-duplication
    /// and no way to unregister.
    pub fn on<F>(&self, event: &str, listener: F)
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        self.inner
            .event_listeners
            .lock()
            .entry(event.to_string())
            .or_default()
            .push(Arc::new(listener));
    }
}

impl Inner {
    /// Pick an unused id and record the completion sender under it.
    ///
    /// Sampling and insertion happen under one lock acquisition, so two
    /// concurrent calls can never pick the same id. Collisions over the
    /// 2^53 id range are rare enough that the retry loop almost never
    /// iterates twice.
    fn track_pending(&self, sender: PendingSender) -> CallId {
        let mut pending = self.pending.lock();
        let mut rng = rand::rng();
        let id = loop {
            let candidate = CallId::new(rng.random_range(0..=CallId::MAX));
            if !pending.contains_key(&candidate) {
                break candidate;
            }
        };
        pending.insert(id, sender);
        id
    }

    fn publish<T: Serialize>(&self, topic: &str, message: &T) {
        match serde_json::to_value(message) {
            Ok(payload) => self.channel.publish(topic, payload),
            Err(err) => tracing::error!("Failed to encode message for {:?}: {}", topic, err),
        }
    }

    fn on_call_request(inner: &Arc<Inner>, payload: Value) {
        let request: CallRequest = match serde_json::from_value(payload) {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!("Dropping malformed call request: {}", err);
                return;
            }
        };

        let handler = inner.call_handlers.lock().get(&request.function).cloned();
        let Some(handler) = handler else {
            // The only error synthesized locally; the id is still echoed
            // so the origin can settle its pending entry.
            let chain = vec![format!("Function {} does not exist!", request.function)];
            inner.publish(CALL_RESULT_TOPIC, &CallResult::error(request.id, chain));
            return;
        };

        // The handler runs as its own task: a suspended handler never
        // blocks delivery of other inbound messages, and a panicking one
        // is caught at the task boundary and reported to the caller.
        let id = request.id;
        let task = inner.runtime.spawn(handler(request.args));
        let runtime = inner.runtime.clone();
        let inner = Arc::clone(inner);
        runtime.spawn(async move {
            let result = match task.await {
                Ok(Ok(data)) => CallResult::ok(id, Some(data)),
                Ok(Err(err)) => {
                    CallResult::error(id, err.chain().map(|cause| cause.to_string()).collect())
                }
                Err(err) => CallResult::error(id, vec![panic_message(err)]),
            };
            inner.publish(CALL_RESULT_TOPIC, &result);
        });
    }

    fn on_call_result(&self, payload: Value) {
        let result: CallResult = match serde_json::from_value(payload) {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!("Dropping malformed call result: {}", err);
                return;
            }
        };

        let sender = self.pending.lock().remove(&result.id());
        let Some(sender) = sender else {
            // Duplicate or stale result; no live caller to attribute it to.
            tracing::debug!("Discarding call result for unknown id {}", result.id());
            return;
        };

        let outcome = match result {
            CallResult::Ok { data, .. } => Ok(data.unwrap_or(Value::Null)),
            CallResult::Error { error, .. } => Err(unpack(&error)),
        };
        // The caller may have dropped its future; nothing left to notify.
        let _ = sender.send(outcome);
    }

    fn on_event(&self, payload: Value) {
        let message: EventMessage = match serde_json::from_value(payload) {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!("Dropping malformed event: {}", err);
                return;
            }
        };

        // Snapshot the listeners so one may call `on` reentrantly.
        let listeners = self.event_listeners.lock().get(&message.event).cloned();
        let Some(listeners) = listeners else {
            tracing::debug!("No listeners for event {:?}", message.event);
            return;
        };
        for listener in listeners {
            listener(&message.args);
        }
    }
}

/// Coerce a handler task failure to a single chain message.
///
/// String panic payloads keep their text; anything else collapses to
/// [`UNKNOWN_ERROR`].
fn panic_message(err: JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => {
            if let Some(message) = payload.downcast_ref::<&str>() {
                (*message).to_string()
            } else if let Some(message) = payload.downcast_ref::<String>() {
                message.clone()
            } else {
                UNKNOWN_ERROR.to_string()
            }
        }
        Err(_) => UNKNOWN_ERROR.to_string(),
    }
}
