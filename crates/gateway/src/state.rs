use std::sync::Arc;

use axum::extract::FromRef;

use idgate_auth::{CredentialEngine, TrustGate};

/// State for the end-user surface.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<CredentialEngine>,
}

impl AppState {
    pub fn new(engine: Arc<CredentialEngine>) -> Self {
        Self { engine }
    }
}

/// State for the backend surface: the same engine plus the trust gate.
#[derive(Clone)]
pub struct BackendState {
    pub engine: Arc<CredentialEngine>,
    pub gate: Arc<TrustGate>,
}

impl FromRef<BackendState> for AppState {
    fn from_ref(state: &BackendState) -> Self {
        Self {
            engine: Arc::clone(&state.engine),
        }
    }
}

impl FromRef<BackendState> for Arc<TrustGate> {
    fn from_ref(state: &BackendState) -> Self {
        Arc::clone(&state.gate)
    }
}
