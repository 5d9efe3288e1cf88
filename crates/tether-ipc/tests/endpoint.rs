//! End-to-end tests for two endpoints wired over a channel.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tether_ipc::protocol::{CALL_RESULT_TOPIC, CALL_TOPIC, EVENT_TOPIC};
use tether_ipc::{pack, Channel, ChannelHandler, Endpoint, LocalChannel};

/// Channel half that records publishes instead of delivering them, so a
/// test can reorder, duplicate, or drop messages before handing them to
/// the other side.
struct RecordingChannel {
    subscribers: Mutex<HashMap<String, Vec<ChannelHandler>>>,
    sent: Mutex<Vec<(String, Value)>>,
}

impl RecordingChannel {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            subscribers: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
        })
    }

    fn take_sent(&self) -> Vec<(String, Value)> {
        std::mem::take(&mut *self.sent.lock())
    }

    fn deliver(&self, topic: &str, payload: Value) {
        let subscribers = self.subscribers.lock();
        if let Some(handlers) = subscribers.get(topic) {
            for handler in handlers {
                handler(payload.clone());
            }
        }
    }
}

impl Channel for RecordingChannel {
    fn subscribe(&self, topic: &str, handler: ChannelHandler) {
        self.subscribers
            .lock()
            .entry(topic.to_string())
            .or_default()
            .push(handler);
    }

    fn publish(&self, topic: &str, payload: Value) {
        self.sent.lock().push((topic.to_string(), payload));
    }
}

/// Let spawned handler tasks run on the current-thread runtime.
async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

fn linked_endpoints() -> (Endpoint, Endpoint) {
    let (host_side, guest_side) = LocalChannel::pair();
    (Endpoint::new(host_side), Endpoint::new(guest_side))
}

#[tokio::test]
async fn test_call_round_trip() {
    let (host, guest) = linked_endpoints();

    guest.register("sum", |args: Vec<Value>| async move {
        let total: i64 = args.iter().filter_map(Value::as_i64).sum();
        Ok(json!(total))
    });

    let result = host.call("sum", vec![json!(1), json!(2), json!(3)]).await;
    assert_eq!(result.unwrap(), json!(6));
}

#[tokio::test]
async fn test_calls_work_in_both_directions() {
    let (host, guest) = linked_endpoints();

    host.register("host-name", |_args| async move { Ok(json!("host")) });
    guest.register("guest-name", |_args| async move { Ok(json!("guest")) });

    assert_eq!(host.call("guest-name", vec![]).await.unwrap(), json!("guest"));
    assert_eq!(guest.call("host-name", vec![]).await.unwrap(), json!("host"));
}

#[tokio::test]
async fn test_unknown_function_rejects_with_exact_message() {
    let (host, _guest) = linked_endpoints();

    let error = host.call("nope", vec![]).await.unwrap_err();
    let remote = error.remote().expect("expected a remote error");
    assert_eq!(remote.message(), "Function nope does not exist!");
    assert!(remote.cause().is_none());
}

#[tokio::test]
async fn test_handler_error_chain_crosses_boundary() {
    let (host, guest) = linked_endpoints();

    guest.register("lookup", |_args| async move {
        Err(anyhow::anyhow!("disk offline")
            .context("query failed")
            .context("lookup failed"))
    });

    let error = host.call("lookup", vec![]).await.unwrap_err();
    let remote = error.remote().expect("expected a remote error");
    assert_eq!(
        pack(remote),
        vec![
            "lookup failed".to_string(),
            "query failed".to_string(),
            "disk offline".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_panicking_handler_reports_panic_message() {
    let (host, guest) = linked_endpoints();

    fn explode_now() {
        panic!("handler exploded");
    }
    guest.register("explode", |_args| async move {
        explode_now();
        Ok(json!(null))
    });

    let error = host.call("explode", vec![]).await.unwrap_err();
    let remote = error.remote().expect("expected a remote error");
    assert_eq!(remote.message(), "handler exploded");
    assert!(remote.cause().is_none());
}

#[tokio::test]
async fn test_reregistering_replaces_handler() {
    let (host, guest) = linked_endpoints();

    guest.register("version", |_args| async move { Ok(json!(1)) });
    guest.register("version", |_args| async move { Ok(json!(2)) });

    assert_eq!(host.call("version", vec![]).await.unwrap(), json!(2));
}

#[tokio::test]
async fn test_suspended_handler_does_not_block_dispatch() {
    let (host, guest) = linked_endpoints();
    let gate = Arc::new(tokio::sync::Notify::new());

    guest.register("wait", {
        let gate = Arc::clone(&gate);
        move |_args| {
            let gate = Arc::clone(&gate);
            async move {
                gate.notified().await;
                Ok(json!("released"))
            }
        }
    });
    guest.register("ping", |_args| async move { Ok(json!("pong")) });

    let waiting = tokio::spawn(host.call("wait", vec![]));
    settle().await;

    // The first call's handler is suspended; the dispatcher must still
    // serve this one.
    assert_eq!(host.call("ping", vec![]).await.unwrap(), json!("pong"));

    gate.notify_one();
    assert_eq!(waiting.await.unwrap().unwrap(), json!("released"));
}

#[tokio::test]
async fn test_results_settle_matching_calls_regardless_of_arrival_order() {
    let caller_side = RecordingChannel::new();
    let callee_side = RecordingChannel::new();
    let caller = Endpoint::new(caller_side.clone());
    let callee = Endpoint::new(callee_side.clone());

    callee.register("echo", |args: Vec<Value>| async move {
        Ok(args.into_iter().next().unwrap_or(Value::Null))
    });

    let first = caller.call("echo", vec![json!("first")]);
    let second = caller.call("echo", vec![json!("second")]);

    let requests = caller_side.take_sent();
    assert_eq!(requests.len(), 2);
    for (topic, payload) in &requests {
        assert_eq!(topic, CALL_TOPIC);
        callee_side.deliver(topic, payload.clone());
    }
    settle().await;

    let mut results = callee_side.take_sent();
    assert_eq!(results.len(), 2);

    // Deliver the second call's result before the first call's.
    results.reverse();
    for (topic, payload) in results {
        assert_eq!(topic, CALL_RESULT_TOPIC);
        caller_side.deliver(&topic, payload);
    }

    assert_eq!(first.await.unwrap(), json!("first"));
    assert_eq!(second.await.unwrap(), json!("second"));
}

#[tokio::test]
async fn test_duplicate_result_is_discarded() {
    let caller_side = RecordingChannel::new();
    let caller = Endpoint::new(caller_side.clone());

    let call = caller.call("echo", vec![]);
    let (_, request) = caller_side.take_sent().pop().expect("request published");
    let id = request.get("id").cloned().expect("request carries an id");

    let result = json!({ "id": id, "status": "ok", "data": "value" });
    caller_side.deliver(CALL_RESULT_TOPIC, result.clone());
    caller_side.deliver(CALL_RESULT_TOPIC, result);

    assert_eq!(call.await.unwrap(), json!("value"));
}

#[tokio::test]
async fn test_result_without_data_resolves_null() {
    let caller_side = RecordingChannel::new();
    let caller = Endpoint::new(caller_side.clone());

    let call = caller.call("fire", vec![]);
    let (_, request) = caller_side.take_sent().pop().expect("request published");
    let id = request.get("id").cloned().expect("request carries an id");

    caller_side.deliver(CALL_RESULT_TOPIC, json!({ "id": id, "status": "ok" }));
    assert_eq!(call.await.unwrap(), Value::Null);
}

#[tokio::test]
async fn test_stale_result_has_no_observable_effect() {
    let (host_side, guest_side) = LocalChannel::pair();
    let host = Endpoint::new(host_side);
    let guest = Endpoint::new(guest_side.clone());

    guest.register("ping", |_args| async move { Ok(json!("pong")) });

    // A result no pending call matches is silently dropped, and the
    // endpoint keeps working normally afterwards.
    guest_side.publish(CALL_RESULT_TOPIC, json!({ "id": 99, "status": "ok" }));
    assert_eq!(host.call("ping", vec![]).await.unwrap(), json!("pong"));
}

#[tokio::test]
async fn test_emit_invokes_listeners_in_registration_order() {
    let (host, guest) = linked_endpoints();
    let log: Arc<Mutex<Vec<(u8, Vec<Value>)>>> = Arc::new(Mutex::new(Vec::new()));

    for tag in 1..=3u8 {
        let log = Arc::clone(&log);
        guest.on("metrics", move |args| {
            log.lock().push((tag, args.to_vec()));
        });
    }

    host.emit("metrics", vec![json!(1), json!(2)]);

    let entries = log.lock();
    assert_eq!(entries.len(), 3);
    for (position, (tag, args)) in entries.iter().enumerate() {
        assert_eq!(*tag as usize, position + 1);
        assert_eq!(args, &vec![json!(1), json!(2)]);
    }
}

#[tokio::test]
async fn test_event_without_args_field_delivers_empty_list() {
    let (host_side, guest_side) = LocalChannel::pair();
    let _host = Endpoint::new(host_side.clone());
    let guest = Endpoint::new(guest_side);

    let seen: Arc<Mutex<Vec<Vec<Value>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    guest.on("heartbeat", move |args| sink.lock().push(args.to_vec()));

    // Raw wire message with no args field at all.
    host_side.publish(EVENT_TOPIC, json!({ "event": "heartbeat" }));

    assert_eq!(*seen.lock(), vec![Vec::<Value>::new()]);
}

#[tokio::test]
async fn test_event_with_no_listeners_is_dropped() {
    let (host, guest) = linked_endpoints();

    host.emit("nobody-cares", vec![json!(1)]);

    // Unrelated delivery still works afterwards.
    let seen = Arc::new(Mutex::new(0u32));
    let sink = Arc::clone(&seen);
    guest.on("counted", move |_args| *sink.lock() += 1);
    host.emit("counted", vec![]);
    assert_eq!(*seen.lock(), 1);
}

#[tokio::test]
async fn test_listener_registered_during_dispatch_runs_next_time() {
    let (host, guest) = linked_endpoints();
    let guest = Arc::new(guest);
    let count = Arc::new(Mutex::new(0u32));

    let reentrant = Arc::clone(&guest);
    let late_count = Arc::clone(&count);
    guest.on("boot", move |_args| {
        let late_count = Arc::clone(&late_count);
        reentrant.on("boot", move |_args| *late_count.lock() += 1);
    });

    host.emit("boot", vec![]);
    assert_eq!(*count.lock(), 0);

    host.emit("boot", vec![]);
    assert_eq!(*count.lock(), 1);
}
