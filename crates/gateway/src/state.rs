use std::sync::Arc;

use mk_domain::config::Config;
use mk_sessions::SessionManager;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionManager>,
    /// Cancelled on shutdown so in-flight lock waits give up promptly.
    pub shutdown: tokio_util::sync::CancellationToken,
}
