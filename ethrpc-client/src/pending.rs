//! Pending-call map for the WebSocket transport
//!
//! Every request written to the socket is registered here first, keyed by its
//! numeric id. Entries come in two shapes:
//!
//! - **Call**: removed by the first reply, which completes the caller's
//!   future.
//! - **Subscription**: the first reply completes the `subscribe` future with
//!   the server subscription id. The entry then stays, and every later reply
//!   with the same request id, as well as every `<api>_subscription`
//!   notification naming that server id, goes to the callback. Only an
//!   acknowledged unsubscribe or connection close removes it.
//!
//! Server ids are only unique within one pub/sub API, so the notification
//! index is keyed by `(api, server id)`.
//!
//! Replies for ids that are not in the map are reported as
//! [`Dispatch::Unmatched`] and leave the map untouched.
//!
//! Callbacks always run after the lock is released, so a callback may call
//! back into the transport.

use ethrpc_core::{Error, JsonRpcNotification, JsonRpcResponse, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};

/// Callback invoked for every subscription delivery after the initial reply
pub type SubscriptionFn = Arc<dyn Fn(Result<Value>) + Send + Sync>;

/// Receives the outcome of a call or the initial value of a subscription
pub type Completion = oneshot::Receiver<Result<Value>>;

enum PendingCall {
    Call {
        tx: oneshot::Sender<Result<Value>>,
    },
    Subscription {
        api: String,
        initial: Option<oneshot::Sender<Result<Value>>>,
        callback: SubscriptionFn,
        server_id: Option<Value>,
    },
}

/// What happened to an inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// A call (or a subscription's initial reply) was completed
    Resolved,
    /// A subscription callback was invoked
    Delivered {
        /// Pub/sub namespace of the subscription (`eth`, `parity`, ...)
        api: String,
    },
    /// Nothing was waiting for this message
    Unmatched,
}

/// A subscription whose initial reply has arrived
#[derive(Debug, Clone, PartialEq)]
pub struct LiveSubscription {
    /// Id of the `<api>_subscribe` request
    pub request_id: u64,
    /// Id the node assigned
    pub server_id: Value,
    /// Pub/sub namespace (`eth`, `parity`, ...)
    pub api: String,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<u64, PendingCall>,
    by_server_id: HashMap<(String, String), u64>,
}

fn server_key(api: &str, server_id: &Value) -> (String, String) {
    (api.to_string(), server_id.to_string())
}

/// Calls and subscriptions awaiting replies on one socket
#[derive(Clone, Default)]
pub struct PendingCalls {
    inner: Arc<Mutex<Inner>>,
}

impl PendingCalls {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a one-shot call
    pub async fn register_call(&self, id: u64) -> Completion {
        let (tx, rx) = oneshot::channel();
        self.inner
            .lock()
            .await
            .entries
            .insert(id, PendingCall::Call { tx });
        rx
    }

    /// Register a subscription request
    ///
    /// The returned receiver yields the initial reply; `callback` receives
    /// everything after it.
    pub async fn register_subscription(
        &self,
        id: u64,
        api: impl Into<String>,
        callback: SubscriptionFn,
    ) -> Completion {
        let (tx, rx) = oneshot::channel();
        self.inner.lock().await.entries.insert(
            id,
            PendingCall::Subscription {
                api: api.into(),
                initial: Some(tx),
                callback,
                server_id: None,
            },
        );
        rx
    }

    /// Drop an entry without completing it (the request never left)
    pub async fn remove(&self, id: u64) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.entries.remove(&id) {
            Some(PendingCall::Subscription {
                api,
                server_id: Some(server_id),
                ..
            }) => {
                let key = server_key(&api, &server_id);
                if inner.by_server_id.get(&key) == Some(&id) {
                    inner.by_server_id.remove(&key);
                }
                true
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Route a response to the entry with the same id
    pub async fn complete(&self, response: JsonRpcResponse) -> Dispatch {
        let Some(id) = response.id.as_u64() else {
            return Dispatch::Unmatched;
        };

        let mut inner = self.inner.lock().await;

        let is_call = match inner.entries.get(&id) {
            None => return Dispatch::Unmatched,
            Some(entry) => matches!(entry, PendingCall::Call { .. }),
        };

        if is_call {
            if let Some(PendingCall::Call { tx }) = inner.entries.remove(&id) {
                let _ = tx.send(response.into_result());
            }
            return Dispatch::Resolved;
        }

        let result = response.into_result();
        let (api, initial, callback) = match inner.entries.get_mut(&id) {
            Some(PendingCall::Subscription {
                api,
                initial,
                callback,
                ..
            }) => (api.clone(), initial.take(), callback.clone()),
            _ => return Dispatch::Unmatched,
        };

        match initial {
            Some(tx) => {
                match &result {
                    Ok(server_id) => {
                        inner.by_server_id.insert(server_key(&api, server_id), id);
                        if let Some(PendingCall::Subscription { server_id: slot, .. }) =
                            inner.entries.get_mut(&id)
                        {
                            *slot = Some(server_id.clone());
                        }
                    }
                    Err(_) => {
                        inner.entries.remove(&id);
                    }
                }
                drop(inner);
                let _ = tx.send(result);
                Dispatch::Resolved
            }
            None => {
                drop(inner);
                callback(result);
                Dispatch::Delivered { api }
            }
        }
    }

    /// Route an `<api>_subscription` notification to its subscription
    pub async fn notify(&self, notification: &JsonRpcNotification) -> Dispatch {
        let (Some(api), Some(params)) = (
            notification.subscription_api(),
            notification.subscription_params(),
        ) else {
            return Dispatch::Unmatched;
        };

        let inner = self.inner.lock().await;
        let callback = inner
            .by_server_id
            .get(&server_key(api, &params.subscription))
            .and_then(|id| inner.entries.get(id))
            .and_then(|entry| match entry {
                PendingCall::Subscription { callback, .. } => Some(callback.clone()),
                PendingCall::Call { .. } => None,
            });
        drop(inner);

        match callback {
            Some(callback) => {
                callback(params.into_result());
                Dispatch::Delivered {
                    api: api.to_string(),
                }
            }
            None => Dispatch::Unmatched,
        }
    }

    /// Live subscriptions the node knows by `server_id`, oldest first
    ///
    /// Usually one; more when several APIs handed out the same id.
    pub async fn find_subscription(&self, server_id: &Value) -> Vec<LiveSubscription> {
        let mut found: Vec<LiveSubscription> = self
            .live_subscriptions()
            .await
            .into_iter()
            .filter(|live| &live.server_id == server_id)
            .collect();
        found.sort_by_key(|live| live.request_id);
        found
    }

    /// Every subscription whose initial reply arrived
    pub async fn live_subscriptions(&self) -> Vec<LiveSubscription> {
        let inner = self.inner.lock().await;
        inner
            .entries
            .iter()
            .filter_map(|(id, entry)| match entry {
                PendingCall::Subscription {
                    api,
                    server_id: Some(server_id),
                    ..
                } => Some(LiveSubscription {
                    request_id: *id,
                    server_id: server_id.clone(),
                    api: api.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    /// Fail every entry and empty the map
    ///
    /// Calls and unanswered subscribe requests complete with `error`; live
    /// subscriptions get one final callback carrying it.
    pub async fn fail_all(&self, error: Error) {
        let drained: Vec<PendingCall> = {
            let mut inner = self.inner.lock().await;
            inner.by_server_id.clear();
            inner.entries.drain().map(|(_, entry)| entry).collect()
        };

        for entry in drained {
            match entry {
                PendingCall::Call { tx } => {
                    let _ = tx.send(Err(error.clone()));
                }
                PendingCall::Subscription {
                    initial: Some(tx), ..
                } => {
                    let _ = tx.send(Err(error.clone()));
                }
                PendingCall::Subscription { callback, .. } => callback(Err(error.clone())),
            }
        }
    }

    /// Number of entries, calls and subscriptions alike
    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    /// True when nothing is pending
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethrpc_core::{JsonRpcErrorData, TransportError};
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    fn recording_callback() -> (SubscriptionFn, Arc<StdMutex<Vec<Result<Value>>>>) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let callback: SubscriptionFn = Arc::new(move |result| {
            seen_clone.lock().unwrap().push(result);
        });
        (callback, seen)
    }

    fn subscription_notification(server_id: Value, result: Value) -> JsonRpcNotification {
        JsonRpcNotification::new(
            "eth_subscription",
            Some(json!({"subscription": server_id, "result": result})),
        )
    }

    #[tokio::test]
    async fn test_register_and_complete_call() {
        let pending = PendingCalls::new();
        let rx = pending.register_call(1).await;
        assert_eq!(pending.len().await, 1);

        let dispatch = pending.complete(JsonRpcResponse::success(json!(42), 1)).await;

        assert_eq!(dispatch, Dispatch::Resolved);
        assert!(pending.is_empty().await);
        assert_eq!(rx.await.unwrap().unwrap(), json!(42));
    }

    #[tokio::test]
    async fn test_call_error_carries_server_message() {
        let pending = PendingCalls::new();
        let rx = pending.register_call(7).await;

        pending
            .complete(JsonRpcResponse::error(JsonRpcErrorData::new(1, "TestError"), 7))
            .await;

        let error = rx.await.unwrap().unwrap_err();
        assert_eq!(error.to_string(), "TestError");
    }

    #[tokio::test]
    async fn test_unmatched_id_leaves_map_untouched() {
        let pending = PendingCalls::new();
        let _rx = pending.register_call(1).await;

        assert_eq!(
            pending.complete(JsonRpcResponse::success(json!("late"), 99)).await,
            Dispatch::Unmatched
        );
        assert_eq!(
            pending.complete(JsonRpcResponse::success(json!("odd"), "1")).await,
            Dispatch::Unmatched
        );
        assert_eq!(pending.len().await, 1);
    }

    #[tokio::test]
    async fn test_duplicate_reply_is_unmatched() {
        let pending = PendingCalls::new();
        let rx = pending.register_call(1).await;

        pending.complete(JsonRpcResponse::success(json!(1), 1)).await;
        let second = pending.complete(JsonRpcResponse::success(json!(2), 1)).await;

        assert_eq!(second, Dispatch::Unmatched);
        assert_eq!(rx.await.unwrap().unwrap(), json!(1));
    }

    #[tokio::test]
    async fn test_subscription_initial_then_replays() {
        let pending = PendingCalls::new();
        let (callback, seen) = recording_callback();
        let rx = pending.register_subscription(3, "eth", callback).await;

        let first = pending.complete(JsonRpcResponse::success(json!("0xab"), 3)).await;
        assert_eq!(first, Dispatch::Resolved);
        assert_eq!(rx.await.unwrap().unwrap(), json!("0xab"));

        let again = pending.complete(JsonRpcResponse::success(json!("next"), 3)).await;
        assert_eq!(again, Dispatch::Delivered { api: "eth".into() });

        let pushed = pending
            .notify(&subscription_notification(json!("0xab"), json!({"number": "0x2"})))
            .await;
        assert_eq!(pushed, Dispatch::Delivered { api: "eth".into() });

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].as_ref().unwrap(), &json!("next"));
        assert_eq!(seen[1].as_ref().unwrap(), &json!({"number": "0x2"}));
        assert_eq!(pending.len().await, 1);
    }

    #[tokio::test]
    async fn test_failed_subscribe_removes_entry() {
        let pending = PendingCalls::new();
        let (callback, seen) = recording_callback();
        let rx = pending.register_subscription(4, "eth", callback).await;

        pending
            .complete(JsonRpcResponse::error(
                JsonRpcErrorData::new(-32601, "Method not found"),
                4,
            ))
            .await;

        assert!(rx.await.unwrap().is_err());
        assert!(pending.is_empty().await);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_notification_for_unknown_subscription() {
        let pending = PendingCalls::new();
        let (callback, seen) = recording_callback();
        let _rx = pending.register_subscription(1, "eth", callback).await;
        pending.complete(JsonRpcResponse::success(json!("0x1"), 1)).await;

        let dispatch = pending
            .notify(&subscription_notification(json!("0x2"), json!(true)))
            .await;

        assert_eq!(dispatch, Dispatch::Unmatched);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_notification_for_other_api_is_unmatched() {
        let pending = PendingCalls::new();
        let (callback, _seen) = recording_callback();
        let _rx = pending.register_subscription(1, "parity", callback).await;
        pending.complete(JsonRpcResponse::success(json!(5), 1)).await;

        let dispatch = pending
            .notify(&subscription_notification(json!(5), json!(true)))
            .await;
        assert_eq!(dispatch, Dispatch::Unmatched);
    }

    #[tokio::test]
    async fn test_subscription_error_notification() {
        let pending = PendingCalls::new();
        let (callback, seen) = recording_callback();
        let _rx = pending.register_subscription(1, "eth", callback).await;
        pending.complete(JsonRpcResponse::success(json!("0x9"), 1)).await;

        let notification = JsonRpcNotification::new(
            "eth_subscription",
            Some(json!({"subscription": "0x9", "error": {"code": -32000, "message": "gone"}})),
        );
        pending.notify(&notification).await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].as_ref().unwrap_err().to_string(), "gone");
    }

    #[tokio::test]
    async fn test_find_and_remove_subscription() {
        let pending = PendingCalls::new();
        let (callback, _seen) = recording_callback();
        let _rx = pending.register_subscription(2, "parity", callback).await;
        pending.complete(JsonRpcResponse::success(json!(17), 2)).await;

        let live = LiveSubscription {
            request_id: 2,
            server_id: json!(17),
            api: "parity".to_string(),
        };
        assert_eq!(pending.find_subscription(&json!(17)).await, vec![live.clone()]);
        assert_eq!(pending.live_subscriptions().await, vec![live]);

        assert!(pending.remove(2).await);
        assert!(!pending.remove(2).await);
        assert!(pending.find_subscription(&json!(17)).await.is_empty());
        assert!(pending.is_empty().await);
    }

    #[tokio::test]
    async fn test_same_server_id_on_two_apis() {
        let pending = PendingCalls::new();
        let (eth_cb, eth_seen) = recording_callback();
        let (parity_cb, parity_seen) = recording_callback();
        let _eth = pending.register_subscription(1, "eth", eth_cb).await;
        let _parity = pending.register_subscription(2, "parity", parity_cb).await;
        pending.complete(JsonRpcResponse::success(json!(1), 1)).await;
        pending.complete(JsonRpcResponse::success(json!(1), 2)).await;

        assert_eq!(
            pending.notify(&subscription_notification(json!(1), json!("eth"))).await,
            Dispatch::Delivered { api: "eth".into() }
        );
        let parity = JsonRpcNotification::new(
            "parity_subscription",
            Some(json!({"subscription": 1, "result": "parity"})),
        );
        assert_eq!(
            pending.notify(&parity).await,
            Dispatch::Delivered { api: "parity".into() }
        );
        assert_eq!(eth_seen.lock().unwrap()[0].as_ref().unwrap(), &json!("eth"));
        assert_eq!(parity_seen.lock().unwrap()[0].as_ref().unwrap(), &json!("parity"));

        let found = pending.find_subscription(&json!(1)).await;
        let ids: Vec<u64> = found.iter().map(|live| live.request_id).collect();
        assert_eq!(ids, vec![1, 2]);

        assert!(pending.remove(1).await);
        assert_eq!(
            pending.notify(&subscription_notification(json!(1), json!("gone"))).await,
            Dispatch::Unmatched
        );
        assert_eq!(
            pending.notify(&parity).await,
            Dispatch::Delivered { api: "parity".into() }
        );

        assert!(pending.remove(2).await);
        assert!(pending.is_empty().await);
    }

    #[tokio::test]
    async fn test_unanswered_subscription_is_not_live() {
        let pending = PendingCalls::new();
        let (callback, _seen) = recording_callback();
        let _rx = pending.register_subscription(2, "eth", callback).await;

        assert!(pending.live_subscriptions().await.is_empty());
    }

    #[tokio::test]
    async fn test_remove_without_completing() {
        let pending = PendingCalls::new();
        let rx = pending.register_call(5).await;

        assert!(pending.remove(5).await);
        assert!(!pending.remove(5).await);
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn test_fail_all() {
        let pending = PendingCalls::new();
        let rx1 = pending.register_call(1).await;
        let rx2 = pending.register_call(2).await;

        let (live_cb, live_seen) = recording_callback();
        let _live_rx = pending.register_subscription(3, "eth", live_cb).await;
        pending.complete(JsonRpcResponse::success(json!("0x3"), 3)).await;

        let (waiting_cb, waiting_seen) = recording_callback();
        let waiting_rx = pending.register_subscription(4, "eth", waiting_cb).await;

        assert_eq!(pending.len().await, 4);

        pending
            .fail_all(TransportError::ConnectionClosed.into())
            .await;

        assert!(pending.is_empty().await);
        assert!(rx1.await.unwrap().unwrap_err().is_transport());
        assert!(rx2.await.unwrap().unwrap_err().is_transport());
        assert!(waiting_rx.await.unwrap().is_err());

        assert_eq!(
            pending.notify(&subscription_notification(json!("0x3"), json!(1))).await,
            Dispatch::Unmatched
        );

        let live_seen = live_seen.lock().unwrap();
        assert_eq!(live_seen.len(), 1);
        assert!(live_seen[0].as_ref().unwrap_err().is_transport());
        assert!(waiting_seen.lock().unwrap().is_empty());
    }
}
