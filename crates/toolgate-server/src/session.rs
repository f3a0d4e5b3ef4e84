use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, RwLock};

/// Buffered envelopes per session before senders start waiting.
const SESSION_BUFFER: usize = 100;

/// Manages the SSE sessions of connected clients.
pub struct SessionManager {
    /// Map of session id -> sender feeding that session's event stream.
    sessions: RwLock<HashMap<String, mpsc::Sender<Value>>>,
}

impl SessionManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Open a new session and return its id and the receiver for its stream.
    pub async fn open(&self) -> (String, mpsc::Receiver<Value>) {
        let session_id = uuid::Uuid::new_v4().simple().to_string();
        let (sender, receiver) = mpsc::channel(SESSION_BUFFER);
        self.sessions
            .write()
            .await
            .insert(session_id.clone(), sender);
        (session_id, receiver)
    }

    /// Push an envelope onto a session's stream.
    /// Returns true if the session exists and its stream is still open; a
    /// session whose client went away is removed.
    pub async fn send(&self, session_id: &str, envelope: Value) -> bool {
        let sender = {
            let sessions = self.sessions.read().await;
            match sessions.get(session_id) {
                Some(sender) => sender.clone(),
                None => return false,
            }
        };

        if sender.send(envelope).await.is_ok() {
            true
        } else {
            tracing::info!(session_id, "Client disconnected, dropping session");
            self.remove(session_id).await;
            false
        }
    }

    /// Remove a session.
    pub async fn remove(&self, session_id: &str) {
        self.sessions.write().await.remove(session_id);
    }

    /// Check if a session is registered.
    pub async fn contains(&self, session_id: &str) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }

    /// Number of sessions whose event stream is still open.
    pub async fn len(&self) -> usize {
        self.sessions
            .read()
            .await
            .values()
            .filter(|sender| !sender.is_closed())
            .count()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Held by a session's event stream; deregisters the session when the
/// stream is dropped, i.e. when the client disconnects.
pub struct SessionGuard {
    sessions: Arc<SessionManager>,
    session_id: String,
}

impl SessionGuard {
    pub fn new(sessions: Arc<SessionManager>, session_id: String) -> Self {
        Self {
            sessions,
            session_id,
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let sessions = Arc::clone(&self.sessions);
        let session_id = std::mem::take(&mut self.session_id);
        // Without a runtime there is no server left to clean up for.
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                sessions.remove(&session_id).await;
                tracing::info!(%session_id, "Client disconnected, session closed");
            });
        }
    }
}
