use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;

use toolgate_core::Error;
use toolgate_mcp::{correlation_key, JsonRpcRequest, JsonRpcResponse};

/// Anything that can put a request envelope on the wire.
#[async_trait]
pub trait Outbound: Send + Sync {
    async fn send(&self, request: &JsonRpcRequest) -> Result<(), Error>;

    /// Identifies the response stream requests sent now will be answered
    /// on, so that losing that stream fails only its own calls.
    fn stream_id(&self) -> u64 {
        0
    }
}

type Slot = oneshot::Sender<Result<JsonRpcResponse, Error>>;

struct PendingCall {
    method: String,
    stream: u64,
    deadline: Instant,
    slot: Slot,
}

/// Owned by the waiting caller; removes the pending entry however the
/// caller stops waiting, including when its future is dropped.
struct PendingGuard<'a> {
    correlator: &'a Correlator,
    id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.correlator.forget(self.id);
    }
}

/// Matches responses arriving on the event stream to the callers waiting
/// for them.
///
/// Every call registers a pending entry under a fresh id; the entry is
/// removed exactly once, by whichever comes first of the matching response,
/// the caller's timeout, the caller giving up, or a transport failure.
#[derive(Default)]
pub struct Correlator {
    pending: Mutex<HashMap<String, PendingCall>>,
}

impl Correlator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<String, PendingCall>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send `method` through `outbound` and wait for its response.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if no response arrives within `timeout`.
    /// - [`Error::Remote`] if the server answered with an error envelope.
    /// - Whatever `outbound` fails with, or [`Error::Transport`] if the
    ///   stream dies while the call is pending.
    pub async fn call(
        &self,
        outbound: &dyn Outbound,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, Error> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let (slot, response) = oneshot::channel();

        self.pending().insert(
            id.clone(),
            PendingCall {
                method: method.to_string(),
                stream: outbound.stream_id(),
                deadline: Instant::now() + timeout,
                slot,
            },
        );

        let _guard = PendingGuard {
            correlator: self,
            id: &id,
        };

        let request = JsonRpcRequest::new(id.as_str(), method, params);
        tracing::debug!(%id, method, "sending request");
        outbound.send(&request).await?;

        match tokio::time::timeout(timeout, response).await {
            Ok(Ok(delivered)) => delivered?.into_result(),
            Ok(Err(_)) => Err(Error::Transport(format!(
                "response slot for {method} dropped"
            ))),
            Err(_) => {
                tracing::warn!(%id, method, ?timeout, "request timed out");
                Err(Error::Timeout {
                    method: method.to_string(),
                })
            }
        }
    }

    /// Deliver an event carrying an `id` to its waiting caller.
    ///
    /// Returns `false` when no call is pending under that id (already
    /// answered, timed out, or never sent); such events are dropped.
    pub fn dispatch(&self, payload: Value) -> bool {
        let Some(id) = payload.get("id").and_then(correlation_key) else {
            return false;
        };

        let Some(pending) = self.pending().remove(&id) else {
            tracing::debug!(%id, "dropping response with no pending call");
            return false;
        };

        if Instant::now() > pending.deadline {
            tracing::debug!(%id, method = %pending.method, "response arrived past its deadline");
        }

        let delivered = serde_json::from_value::<JsonRpcResponse>(payload)
            .map_err(|e| Error::Protocol(format!("malformed response to {}: {e}", pending.method)));

        // The receiver is gone only if the caller itself was dropped.
        pending.slot.send(delivered).is_ok()
    }

    /// Fail every pending call with a transport error. Returns how many
    /// calls were failed.
    pub fn fail_all(&self, reason: &str) -> usize {
        let drained: Vec<(String, PendingCall)> = self.pending().drain().collect();
        Self::fail(drained, reason)
    }

    /// Fail the pending calls that were sent for response stream `stream`.
    /// Calls belonging to other streams are left alone.
    pub fn fail_stream(&self, stream: u64, reason: &str) -> usize {
        let drained: Vec<(String, PendingCall)> = {
            let mut pending = self.pending();
            let ids: Vec<String> = pending
                .iter()
                .filter(|(_, call)| call.stream == stream)
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| pending.remove(&id).map(|call| (id, call)))
                .collect()
        };
        Self::fail(drained, reason)
    }

    fn fail(drained: Vec<(String, PendingCall)>, reason: &str) -> usize {
        let count = drained.len();
        for (id, pending) in drained {
            tracing::debug!(%id, method = %pending.method, "failing pending call");
            let _ = pending.slot.send(Err(Error::Transport(reason.to_string())));
        }
        count
    }

    /// Number of calls currently awaiting a response.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending().len()
    }

    fn forget(&self, id: &str) {
        self.pending().remove(id);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;

    /// Answers every request by echoing its params back, after a delay that
    /// shrinks with each request so responses arrive out of order.
    struct Loopback {
        correlator: Arc<Correlator>,
        remaining: Mutex<u64>,
    }

    #[async_trait]
    impl Outbound for Loopback {
        async fn send(&self, request: &JsonRpcRequest) -> Result<(), Error> {
            let delay = {
                let mut remaining = self.remaining.lock().unwrap();
                *remaining = remaining.saturating_sub(1);
                Duration::from_millis(*remaining)
            };
            let correlator = Arc::clone(&self.correlator);
            let response = json!({
                "jsonrpc": "2.0",
                "id": request.id,
                "result": {"echo": request.params},
            });
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                correlator.dispatch(response);
            });
            Ok(())
        }
    }

    /// Records requests and never answers.
    #[derive(Default)]
    struct Silent {
        stream: u64,
        sent: Mutex<Vec<JsonRpcRequest>>,
    }

    #[async_trait]
    impl Outbound for Silent {
        async fn send(&self, request: &JsonRpcRequest) -> Result<(), Error> {
            self.sent.lock().unwrap().push(request.clone());
            Ok(())
        }

        fn stream_id(&self) -> u64 {
            self.stream
        }
    }

    struct Unreachable;

    #[async_trait]
    impl Outbound for Unreachable {
        async fn send(&self, _request: &JsonRpcRequest) -> Result<(), Error> {
            Err(Error::EndpointUnknown)
        }
    }

    #[tokio::test]
    async fn concurrent_calls_get_their_own_responses() {
        let correlator = Arc::new(Correlator::new());
        let outbound = Arc::new(Loopback {
            correlator: Arc::clone(&correlator),
            remaining: Mutex::new(64),
        });

        let mut handles = Vec::new();
        for n in 0..50 {
            let correlator = Arc::clone(&correlator);
            let outbound = Arc::clone(&outbound);
            handles.push(tokio::spawn(async move {
                let result = correlator
                    .call(
                        outbound.as_ref(),
                        "tools/call",
                        Some(json!({"n": n})),
                        Duration::from_secs(5),
                    )
                    .await
                    .unwrap();
                (n, result)
            }));
        }

        for handle in handles {
            let (n, result) = handle.await.unwrap();
            assert_eq!(result, json!({"echo": {"n": n}}));
        }
        assert_eq!(correlator.pending_len(), 0);
    }

    #[tokio::test]
    async fn timeout_removes_pending_and_late_delivery_is_noop() {
        let correlator = Correlator::new();
        let outbound = Silent::default();

        let err = correlator
            .call(&outbound, "tools/list", None, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::Timeout {
                method: "tools/list".to_string()
            }
        );
        assert_eq!(correlator.pending_len(), 0);

        let id = outbound.sent.lock().unwrap()[0].id.clone();
        let delivered = correlator.dispatch(json!({"jsonrpc": "2.0", "id": id, "result": {}}));
        assert!(!delivered);
        assert_eq!(correlator.pending_len(), 0);
    }

    #[tokio::test]
    async fn remote_error_surfaces_message() {
        let correlator = Arc::new(Correlator::new());
        let outbound = Arc::new(Silent::default());

        let call = {
            let correlator = Arc::clone(&correlator);
            let outbound = Arc::clone(&outbound);
            tokio::spawn(async move {
                correlator
                    .call(outbound.as_ref(), "tools/call", None, Duration::from_secs(5))
                    .await
            })
        };

        let id = loop {
            if let Some(request) = outbound.sent.lock().unwrap().first() {
                break request.id.clone();
            }
            tokio::task::yield_now().await;
        };
        assert!(correlator.dispatch(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": -32000, "message": "tool exploded"}
        })));

        let err = call.await.unwrap().unwrap_err();
        assert_eq!(
            err,
            Error::Remote {
                code: -32000,
                message: "tool exploded".to_string()
            }
        );
    }

    #[tokio::test]
    async fn duplicate_delivery_is_noop() {
        let correlator = Arc::new(Correlator::new());
        let outbound = Arc::new(Silent::default());

        let call = {
            let correlator = Arc::clone(&correlator);
            let outbound = Arc::clone(&outbound);
            tokio::spawn(async move {
                correlator
                    .call(outbound.as_ref(), "initialize", None, Duration::from_secs(5))
                    .await
            })
        };

        let id = loop {
            if let Some(request) = outbound.sent.lock().unwrap().first() {
                break request.id.clone();
            }
            tokio::task::yield_now().await;
        };
        let response = json!({"jsonrpc": "2.0", "id": id, "result": {"first": true}});
        assert!(correlator.dispatch(response.clone()));
        assert!(!correlator.dispatch(response));

        assert_eq!(call.await.unwrap().unwrap(), json!({"first": true}));
    }

    #[tokio::test]
    async fn send_failure_cleans_up() {
        let correlator = Correlator::new();
        let err = correlator
            .call(&Unreachable, "initialize", None, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err, Error::EndpointUnknown);
        assert_eq!(correlator.pending_len(), 0);
    }

    #[tokio::test]
    async fn fail_all_wakes_waiters() {
        let correlator = Arc::new(Correlator::new());
        let outbound = Arc::new(Silent::default());

        let call = {
            let correlator = Arc::clone(&correlator);
            let outbound = Arc::clone(&outbound);
            tokio::spawn(async move {
                correlator
                    .call(outbound.as_ref(), "tools/list", None, Duration::from_secs(30))
                    .await
            })
        };

        while correlator.pending_len() == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(correlator.fail_all("stream dropped"), 1);

        let err = call.await.unwrap().unwrap_err();
        assert_eq!(err, Error::Transport("stream dropped".to_string()));
    }

    #[tokio::test]
    async fn abandoned_call_is_forgotten() {
        let correlator = Arc::new(Correlator::new());
        let outbound = Arc::new(Silent::default());

        let call = {
            let correlator = Arc::clone(&correlator);
            let outbound = Arc::clone(&outbound);
            tokio::spawn(async move {
                correlator
                    .call(outbound.as_ref(), "tools/call", None, Duration::from_secs(5))
                    .await
            })
        };

        while correlator.pending_len() == 0 {
            tokio::task::yield_now().await;
        }
        call.abort();
        assert!(call.await.unwrap_err().is_cancelled());
        assert_eq!(correlator.pending_len(), 0);

        // An outer deadline shorter than the call's own drops it the same way.
        let outer = tokio::time::timeout(
            Duration::from_millis(20),
            correlator.call(outbound.as_ref(), "tools/list", None, Duration::from_secs(30)),
        )
        .await;
        assert!(outer.is_err());
        assert_eq!(correlator.pending_len(), 0);
    }

    #[tokio::test]
    async fn losing_a_stream_fails_only_its_own_calls() {
        let correlator = Arc::new(Correlator::new());
        let old_stream = Arc::new(Silent {
            stream: 1,
            ..Silent::default()
        });
        let new_stream = Arc::new(Silent {
            stream: 2,
            ..Silent::default()
        });

        let spawn_call = |outbound: Arc<Silent>| {
            let correlator = Arc::clone(&correlator);
            tokio::spawn(async move {
                correlator
                    .call(outbound.as_ref(), "tools/call", None, Duration::from_secs(30))
                    .await
            })
        };
        let stale = spawn_call(Arc::clone(&old_stream));
        let fresh = spawn_call(Arc::clone(&new_stream));

        while correlator.pending_len() < 2 {
            tokio::task::yield_now().await;
        }
        assert_eq!(correlator.fail_stream(1, "event stream ended"), 1);
        assert_eq!(
            stale.await.unwrap().unwrap_err(),
            Error::Transport("event stream ended".to_string())
        );

        let id = loop {
            if let Some(request) = new_stream.sent.lock().unwrap().first() {
                break request.id.clone();
            }
            tokio::task::yield_now().await;
        };
        assert!(correlator.dispatch(json!({"jsonrpc": "2.0", "id": id, "result": {"ok": true}})));
        assert_eq!(fresh.await.unwrap().unwrap(), json!({"ok": true}));
        assert_eq!(correlator.pending_len(), 0);
    }

    #[test]
    fn events_without_id_are_ignored() {
        let correlator = Correlator::new();
        assert!(!correlator.dispatch(json!({"jsonrpc": "2.0", "method": "notifications/message"})));
        assert!(!correlator.dispatch(json!({"jsonrpc": "2.0", "id": null, "result": {}})));
    }
}
