//! Service-to-service surface. Every route sits behind the trust gate, which
//! runs before any handler touches the engine.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Request, State, rejection::JsonRejection},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::post,
};

use {
    idgate_auth::{SERVICE_KEY_HEADER, TrustGate},
    serde::Deserialize,
    tracing::warn,
};

use crate::{
    error::ApiError,
    state::{AppState, BackendState},
    user_routes::{UserBody, login_handler, validate_handler},
};

#[derive(Debug, Deserialize)]
pub struct LookupRequest {
    pub user_uuid: String,
}

/// Backend routes, relative to `/v1/auth`.
pub fn backend_router(state: &BackendState) -> Router<BackendState> {
    Router::new()
        .route("/login", post(login_handler))
        .route("/validate-token", post(validate_handler))
        .route("/lookup", post(lookup_handler))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.gate),
            require_service_key,
        ))
}

/// Reject callers that do not present the configured service key.
pub async fn require_service_key(
    State(gate): State<Arc<TrustGate>>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(SERVICE_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    if let Err(e) = gate.check(presented) {
        warn!(path = %request.uri().path(), error = %e, "backend call rejected by trust gate");
        return ApiError::from(e).into_response();
    }
    next.run(request).await
}

async fn lookup_handler(
    State(state): State<AppState>,
    body: Result<Json<LookupRequest>, JsonRejection>,
) -> Result<Json<UserBody>, ApiError> {
    let Json(req) = body?;
    let user = state
        .engine
        .lookup(&req.user_uuid)
        .await?
        .ok_or(ApiError::NotFound("user not found"))?;
    Ok(Json(user.into()))
}
