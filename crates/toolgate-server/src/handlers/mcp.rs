use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive},
    response::{IntoResponse, Response, Sse},
    Json,
};
use tokio_stream::{wrappers::ReceiverStream, StreamExt};

use crate::app_state::AppState;
use crate::publisher::parse_request;
use crate::session::SessionGuard;

/// Query string of the side channel.
#[derive(serde::Deserialize)]
pub struct SessionQuery {
    pub session_id: String,
}

/// SSE stream for a tool client.
///
/// 1. Server opens a session and sends `event: endpoint` whose data is
///    `{"url": "/messages?session_id=..."}`
/// 2. Client POSTs JSON-RPC to that URL
/// 3. Server sends responses back via SSE `event: message`
pub async fn mcp_sse(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let (session_id, rx) = state.sessions.open().await;
    tracing::info!(%session_id, "Client connected via SSE");

    let endpoint = serde_json::json!({ "url": format!("/messages?session_id={session_id}") });
    let init_stream = tokio_stream::once(Ok(Event::default()
        .event("endpoint")
        .json_data(&endpoint)
        .unwrap_or_else(|_| Event::default().data("error serializing endpoint"))));

    // The session lives exactly as long as the client holds the stream.
    let guard = SessionGuard::new(Arc::clone(&state.sessions), session_id);
    let event_stream = ReceiverStream::new(rx).map(move |value| {
        let _session = &guard;
        Ok(Event::default()
            .event("message")
            .json_data(&value)
            .unwrap_or_else(|_| Event::default().data("error serializing response")))
    });

    Sse::new(init_stream.chain(event_stream)).keep_alive(KeepAlive::default())
}

/// Side channel of an SSE session.
///
/// Accepts the request with 202 and sends the response through the
/// session's event stream once the call completes.
pub async fn mcp_message(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
    body: Bytes,
) -> Response {
    if !state.sessions.contains(&query.session_id).await {
        return (StatusCode::NOT_FOUND, "Unknown session").into_response();
    }

    let request = match parse_request(&body) {
        Ok(request) => request,
        Err(response) => return (StatusCode::BAD_REQUEST, Json(response)).into_response(),
    };

    tokio::spawn(async move {
        let method = request.method.clone();
        let Some(response) = state.publisher.dispatch(request).await else {
            return;
        };
        let value = serde_json::to_value(&response).unwrap_or_default();
        if !state.sessions.send(&query.session_id, value).await {
            tracing::warn!(
                session_id = %query.session_id,
                %method,
                "Response dropped, session is gone"
            );
        }
    });

    StatusCode::ACCEPTED.into_response()
}

/// Plain HTTP request/response: the JSON-RPC response is the body.
pub async fn mcp_request(State(state): State<AppState>, body: Bytes) -> Response {
    let request = match parse_request(&body) {
        Ok(request) => request,
        Err(response) => return (StatusCode::BAD_REQUEST, Json(response)).into_response(),
    };

    match state.publisher.dispatch(request).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}
