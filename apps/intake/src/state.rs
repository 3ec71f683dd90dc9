use crate::intake::SessionRegistry;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Live intake sessions. Each one owns a controller task and its preview file.
    pub sessions: SessionRegistry,
}
