//! Application state for HTTP handlers.

use std::sync::Arc;

use docrest_server::DocumentService;

use crate::auth::Authenticator;

/// State shared across all request tasks.
#[derive(Clone)]
pub struct AppState {
    /// The transactional document service.
    pub service: Arc<DocumentService>,
    /// The configured authenticator; `None` makes every caller anonymous.
    pub authenticator: Option<Arc<dyn Authenticator>>,
}

impl AppState {
    /// Creates state without authentication.
    pub fn new(service: Arc<DocumentService>) -> Self {
        Self {
            service,
            authenticator: None,
        }
    }

    /// Attaches an authenticator.
    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }
}
