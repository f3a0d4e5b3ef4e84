//! Scripted tool server for exercising the client against awkward peers.
//!
//! `tools/call` behaviour is chosen by tool name:
//! - `add`: replies with the sum of `a` and `b`
//! - `slow`: replies after [`SLOW_REPLY`]
//! - `fail`: replies with a `-32000` error envelope
//! - `noisy`: pushes a non-JSON event and an id-less event, then replies
//! - `hang_up`: ends the event stream without replying

#![allow(dead_code)]

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, Sse},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::{wrappers::ReceiverStream, Stream, StreamExt};

pub const SLOW_REPLY: Duration = Duration::from_millis(500);

#[derive(Clone, Copy, Default)]
pub struct StubOptions {
    /// Announce the side channel as a bare path instead of `{"url": ...}`.
    pub bare_endpoint: bool,
}

#[derive(Clone)]
struct StubState {
    options: StubOptions,
    counts: Arc<Mutex<HashMap<String, usize>>>,
    outbox: Arc<Mutex<Option<mpsc::Sender<Event>>>>,
}

pub struct StubServer {
    pub addr: SocketAddr,
    state: StubState,
}

impl StubServer {
    pub async fn start(options: StubOptions) -> Self {
        let state = StubState {
            options,
            counts: Arc::default(),
            outbox: Arc::default(),
        };

        let app = Router::new()
            .route("/sse", get(stream))
            .route("/messages", post(message))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// How many times `method` was received (`sse` counts stream opens).
    pub fn count(&self, method: &str) -> usize {
        self.state
            .counts
            .lock()
            .unwrap()
            .get(method)
            .copied()
            .unwrap_or(0)
    }
}

fn bump(state: &StubState, key: &str) {
    *state.counts.lock().unwrap().entry(key.to_string()).or_default() += 1;
}

async fn stream(State(state): State<StubState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    bump(&state, "sse");

    let (tx, rx) = mpsc::channel(32);
    *state.outbox.lock().unwrap() = Some(tx);

    let endpoint = if state.options.bare_endpoint {
        Event::default()
            .event("endpoint")
            .data("/messages?session_id=stub")
    } else {
        Event::default()
            .event("endpoint")
            .data(json!({"url": "/messages?session_id=stub"}).to_string())
    };

    Sse::new(tokio_stream::once(endpoint).chain(ReceiverStream::new(rx)).map(Ok::<_, Infallible>))
}

async fn message(State(state): State<StubState>, Json(request): Json<Value>) -> StatusCode {
    let method = request["method"].as_str().unwrap_or_default().to_string();
    bump(&state, &method);

    let Some(id) = request.get("id").cloned() else {
        return StatusCode::ACCEPTED;
    };

    let tool = request["params"]["name"].as_str().unwrap_or_default().to_string();
    if method == "tools/call" && tool == "hang_up" {
        state.outbox.lock().unwrap().take();
        return StatusCode::ACCEPTED;
    }

    let Some(outbox) = state.outbox.lock().unwrap().clone() else {
        return StatusCode::GONE;
    };

    tokio::spawn(async move {
        let reply = match (method.as_str(), tool.as_str()) {
            ("initialize", _) => success(&id, json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "stub", "version": "0"}
            })),
            ("tools/list", _) => success(&id, json!({
                "tools": [{
                    "name": "add",
                    "description": "Add two integers.",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "a": {"type": "integer"},
                            "b": {"type": "integer"}
                        },
                        "required": ["a", "b"]
                    }
                }]
            })),
            ("tools/call", "add") => {
                let args = &request["params"]["arguments"];
                let sum = args["a"].as_i64().unwrap_or(0) + args["b"].as_i64().unwrap_or(0);
                text_result(&id, &sum.to_string())
            }
            ("tools/call", "slow") => {
                tokio::time::sleep(SLOW_REPLY).await;
                text_result(&id, "\"late\"")
            }
            ("tools/call", "fail") => json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": -32000, "message": "boom"}
            }),
            ("tools/call", "noisy") => {
                let _ = outbox.send(Event::default().event("message").data("not json {")).await;
                let _ = outbox
                    .send(Event::default().event("message").data(
                        json!({"jsonrpc": "2.0", "method": "notifications/progress"}).to_string(),
                    ))
                    .await;
                text_result(&id, "\"quiet now\"")
            }
            _ => json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": -32601, "message": format!("Method not found: {method}")}
            }),
        };

        let _ = outbox
            .send(Event::default().event("message").data(reply.to_string()))
            .await;
    });

    StatusCode::ACCEPTED
}

fn success(id: &Value, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

fn text_result(id: &Value, text: &str) -> Value {
    success(id, json!({"content": [{"type": "text", "text": text}]}))
}
