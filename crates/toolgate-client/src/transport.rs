use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use reqwest_eventsource::{retry::Never, Event, EventSource};
use serde_json::Value;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;

use toolgate_core::Error;
use toolgate_mcp::{correlation_key, JsonRpcRequest};

use crate::correlator::{Correlator, Outbound};

/// State of the side channel announced on the event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointState {
    /// Stream opened (or opening), no announcement yet.
    Pending,
    /// The server told us where to POST requests.
    Ready(Url),
    /// The receive loop has exited.
    Closed(String),
}

/// What a single event on the stream means to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Side-channel announcement carrying the (possibly relative) URL.
    Endpoint(String),
    /// A candidate response carrying an id.
    Response(Value),
    /// Valid JSON that is not addressed to any caller.
    Ignored,
    /// Body that is not JSON.
    Malformed(String),
}

impl StreamEvent {
    /// Classify one complete event body.
    ///
    /// A JSON object with a `url` member is an endpoint announcement. The
    /// bare-path form (`event: endpoint` with `data: /messages?...`) is
    /// accepted too.
    #[must_use]
    pub fn classify(event_type: &str, data: &str) -> Self {
        match serde_json::from_str::<Value>(data) {
            Ok(payload) => {
                if let Some(url) = payload.get("url").and_then(Value::as_str) {
                    return Self::Endpoint(url.to_string());
                }
                if payload.get("id").and_then(correlation_key).is_some() {
                    Self::Response(payload)
                } else {
                    Self::Ignored
                }
            }
            Err(_) if event_type == "endpoint" && !data.trim().is_empty() => {
                Self::Endpoint(data.trim().to_string())
            }
            Err(err) => Self::Malformed(err.to_string()),
        }
    }
}

/// Strip a trailing slash and a trailing `/sse` so either form of the
/// server address can be configured.
#[must_use]
pub fn normalize_base_url(base_url: &str) -> String {
    let trimmed = base_url.trim().trim_end_matches('/');
    trimmed.strip_suffix("/sse").unwrap_or(trimmed).to_string()
}

struct Listener {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Server-sent-events transport: one long-lived event stream for responses
/// plus POSTs to the announced side channel for requests.
pub struct SseTransport {
    base_url: Url,
    http: Client,
    endpoint: Arc<watch::Sender<EndpointState>>,
    correlator: Arc<Correlator>,
    listener: Mutex<Option<Listener>>,
    /// Incremented for every event stream opened.
    stream_id: AtomicU64,
    request_timeout: Duration,
    close_timeout: Duration,
}

impl SseTransport {
    /// Create a transport for `base_url`. Nothing is connected until
    /// [`SseTransport::ensure_started`] is called.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if `base_url` is not a valid URL.
    pub fn new(
        base_url: &str,
        correlator: Arc<Correlator>,
        request_timeout: Duration,
        close_timeout: Duration,
    ) -> Result<Self, Error> {
        let normalized = normalize_base_url(base_url);
        let base_url = Url::parse(&normalized)
            .map_err(|e| Error::Transport(format!("invalid base URL '{normalized}': {e}")))?;

        let (endpoint, _) = watch::channel(EndpointState::Pending);

        Ok(Self {
            base_url,
            http: Client::new(),
            endpoint: Arc::new(endpoint),
            correlator,
            listener: Mutex::new(None),
            stream_id: AtomicU64::new(0),
            request_timeout,
            close_timeout,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn stream_url(&self) -> String {
        format!("{}/sse", self.base_url.as_str().trim_end_matches('/'))
    }

    /// Current side-channel state.
    #[must_use]
    pub fn endpoint(&self) -> EndpointState {
        self.endpoint.borrow().clone()
    }

    /// Open the event stream unless a receive loop is already running.
    ///
    /// A loop that exited (closed or failed) is replaced by a fresh stream;
    /// calls that were in flight on the old stream are not retried.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the stream request cannot be built.
    pub async fn ensure_started(&self) -> Result<(), Error> {
        let mut listener = self.listener.lock().await;
        let running = listener.as_ref().is_some_and(|l| !l.handle.is_finished());
        if running && !matches!(self.endpoint(), EndpointState::Closed(_)) {
            return Ok(());
        }

        let url = self.stream_url();
        let mut source = EventSource::new(self.http.get(&url))
            .map_err(|e| Error::Transport(format!("cannot open event stream {url}: {e}")))?;
        source.set_retry_policy(Box::new(Never));

        let stream_id = self.stream_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.endpoint.send_replace(EndpointState::Pending);
        tracing::info!(%url, stream_id, "Connecting to event stream");

        let (stop, stopped) = oneshot::channel();
        let handle = tokio::spawn(receive_loop(
            source,
            self.base_url.clone(),
            Arc::clone(&self.endpoint),
            Arc::clone(&self.correlator),
            stream_id,
            stopped,
        ));

        *listener = Some(Listener { stop, handle });
        Ok(())
    }

    /// Wait until the side channel has been announced.
    ///
    /// # Errors
    ///
    /// - [`Error::Transport`] if the stream closes before announcing.
    /// - [`Error::Timeout`] if no announcement arrives within `timeout`.
    pub async fn wait_for_endpoint(&self, timeout: Duration) -> Result<Url, Error> {
        let mut state = self.endpoint.subscribe();
        let waited = tokio::time::timeout(
            timeout,
            state.wait_for(|s| !matches!(s, EndpointState::Pending)),
        )
        .await;

        match waited {
            Ok(Ok(state)) => match &*state {
                EndpointState::Ready(url) => Ok(url.clone()),
                EndpointState::Closed(reason) => Err(Error::Transport(reason.clone())),
                EndpointState::Pending => Err(Error::EndpointUnknown),
            },
            Ok(Err(_)) => Err(Error::Transport("endpoint watch closed".to_string())),
            Err(_) => Err(Error::Timeout {
                method: "endpoint announcement".to_string(),
            }),
        }
    }

    /// Stop the receive loop and release the connection.
    ///
    /// Safe to call repeatedly and after the loop already died.
    pub async fn close(&self) {
        let Some(Listener { stop, mut handle }) = self.listener.lock().await.take() else {
            return;
        };

        let _ = stop.send(());
        if tokio::time::timeout(self.close_timeout, &mut handle)
            .await
            .is_err()
        {
            tracing::warn!(
                timeout = ?self.close_timeout,
                "receive loop did not stop in time, aborting"
            );
            handle.abort();
        }
        tracing::info!(base_url = %self.base_url, "Transport closed");
    }
}

#[async_trait]
impl Outbound for SseTransport {
    async fn send(&self, request: &JsonRpcRequest) -> Result<(), Error> {
        let url = match self.endpoint() {
            EndpointState::Ready(url) => url,
            EndpointState::Pending => return Err(Error::EndpointUnknown),
            EndpointState::Closed(reason) => return Err(Error::Transport(reason)),
        };

        let response = self
            .http
            .post(url)
            .timeout(self.request_timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("failed to post {}: {e}", request.method)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transport(format!(
                "side channel rejected {} with {status}: {body}",
                request.method
            )));
        }
        Ok(())
    }

    fn stream_id(&self) -> u64 {
        self.stream_id.load(Ordering::SeqCst)
    }
}

fn resolve_endpoint(base_url: &Url, announced: &str) -> Result<Url, Error> {
    Url::parse(announced)
        .or_else(|_| base_url.join(announced))
        .map_err(|e| Error::Protocol(format!("bad endpoint announcement '{announced}': {e}")))
}

async fn receive_loop(
    mut source: EventSource,
    base_url: Url,
    endpoint: Arc<watch::Sender<EndpointState>>,
    correlator: Arc<Correlator>,
    stream_id: u64,
    mut stopped: oneshot::Receiver<()>,
) {
    let reason = loop {
        tokio::select! {
            _ = &mut stopped => break "transport closed".to_string(),
            event = source.next() => match event {
                Some(Ok(Event::Open)) => {
                    tracing::info!(%base_url, "Event stream established");
                }
                Some(Ok(Event::Message(message))) => {
                    handle_event(&message.event, &message.data, &base_url, &endpoint, &correlator);
                }
                Some(Err(err)) => {
                    tracing::error!(%base_url, "Event stream failed: {err}");
                    break format!("event stream failed: {err}");
                }
                None => break "event stream ended".to_string(),
            },
        }
    };

    source.close();
    endpoint.send_replace(EndpointState::Closed(reason.clone()));

    // A replacement stream may already be serving new calls; only the calls
    // sent for this stream are failed.
    let failed = correlator.fail_stream(stream_id, &reason);
    if failed > 0 {
        tracing::warn!(failed, stream_id, %reason, "Failed in-flight calls");
    }
}

fn handle_event(
    event_type: &str,
    data: &str,
    base_url: &Url,
    endpoint: &watch::Sender<EndpointState>,
    correlator: &Correlator,
) {
    match StreamEvent::classify(event_type, data) {
        StreamEvent::Endpoint(announced) => match resolve_endpoint(base_url, &announced) {
            Ok(url) => {
                tracing::info!(%url, "Side channel announced");
                endpoint.send_replace(EndpointState::Ready(url));
            }
            Err(err) => tracing::warn!("{err}"),
        },
        StreamEvent::Response(payload) => {
            correlator.dispatch(payload);
        }
        StreamEvent::Ignored => {
            tracing::debug!(event_type, "Ignoring event without id");
        }
        StreamEvent::Malformed(reason) => {
            tracing::warn!(event_type, %reason, "Skipping non-JSON event: {data}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classify_endpoint_announcement() {
        assert_eq!(
            StreamEvent::classify("message", r#"{"url":"/messages?session_id=1"}"#),
            StreamEvent::Endpoint("/messages?session_id=1".to_string())
        );
        assert_eq!(
            StreamEvent::classify("endpoint", "/messages?session_id=2\n"),
            StreamEvent::Endpoint("/messages?session_id=2".to_string())
        );
    }

    #[test]
    fn classify_responses_and_noise() {
        assert_eq!(
            StreamEvent::classify("message", r#"{"jsonrpc":"2.0","id":"a","result":{}}"#),
            StreamEvent::Response(json!({"jsonrpc":"2.0","id":"a","result":{}}))
        );
        assert_eq!(
            StreamEvent::classify("message", r#"{"jsonrpc":"2.0","method":"ping"}"#),
            StreamEvent::Ignored
        );
        assert!(matches!(
            StreamEvent::classify("message", "not json"),
            StreamEvent::Malformed(_)
        ));
    }

    #[test]
    fn multi_line_data_is_one_body() {
        // reqwest-eventsource joins consecutive data lines with '\n'.
        let data = "{\"jsonrpc\":\"2.0\",\n\"id\":\"x\",\n\"result\":{\"ok\":true}}";
        assert_eq!(
            StreamEvent::classify("message", data),
            StreamEvent::Response(json!({"jsonrpc":"2.0","id":"x","result":{"ok":true}}))
        );
    }

    #[test]
    fn normalize_strips_sse_suffix() {
        assert_eq!(normalize_base_url("http://localhost:8000/sse"), "http://localhost:8000");
        assert_eq!(normalize_base_url("http://localhost:8000/sse/"), "http://localhost:8000");
        assert_eq!(normalize_base_url("http://localhost:8000/"), "http://localhost:8000");
        assert_eq!(normalize_base_url("http://host/api"), "http://host/api");
    }

    #[test]
    fn endpoint_resolution() {
        let base = Url::parse("http://localhost:8000").unwrap();
        assert_eq!(
            resolve_endpoint(&base, "/messages?session_id=abc").unwrap().as_str(),
            "http://localhost:8000/messages?session_id=abc"
        );
        assert_eq!(
            resolve_endpoint(&base, "http://other:9000/post").unwrap().as_str(),
            "http://other:9000/post"
        );
    }

    #[tokio::test]
    async fn send_before_announcement_fails() {
        let transport = SseTransport::new(
            "http://127.0.0.1:9",
            Arc::new(Correlator::new()),
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .unwrap();
        let err = transport
            .send(&JsonRpcRequest::new("1", "initialize", None))
            .await
            .unwrap_err();
        assert_eq!(err, Error::EndpointUnknown);
    }

    #[tokio::test]
    async fn close_without_start_is_noop() {
        let transport = SseTransport::new(
            "http://127.0.0.1:9",
            Arc::new(Correlator::new()),
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .unwrap();
        transport.close().await;
        transport.close().await;
        assert_eq!(transport.endpoint(), EndpointState::Pending);
    }

    #[test]
    fn invalid_base_url_rejected() {
        let result = SseTransport::new(
            "not a url",
            Arc::new(Correlator::new()),
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(Error::Transport(_))));
    }
}
