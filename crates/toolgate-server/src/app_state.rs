use std::sync::Arc;

use crate::publisher::ToolPublisher;
use crate::session::SessionManager;

/// Shared application state with injected dependencies.
#[derive(Clone)]
pub struct AppState {
    pub publisher: Arc<ToolPublisher>,
    pub sessions: Arc<SessionManager>,
}

impl AppState {
    #[must_use]
    pub fn new(publisher: ToolPublisher) -> Self {
        Self {
            publisher: Arc::new(publisher),
            sessions: Arc::new(SessionManager::new()),
        }
    }
}
