use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use idgate_auth::AuthError;

/// Error returned by every handler. Status codes are chosen from the error
/// variant, never from message text.
#[derive(Debug)]
pub enum ApiError {
    Auth(AuthError),
    /// Request body could not be parsed into the expected shape.
    BadRequest(String),
    NotFound(&'static str),
}

impl ApiError {
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Auth(AuthError::unauthenticated(message))
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::Auth(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "error": message }),
            ),
            Self::NotFound(message) => (
                StatusCode::NOT_FOUND,
                serde_json::json!({ "error": message }),
            ),
            Self::Auth(err) => auth_error_parts(&err),
        };
        (status, Json(body)).into_response()
    }
}

fn auth_error_parts(err: &AuthError) -> (StatusCode, serde_json::Value) {
    match err {
        AuthError::InvalidInput(message) => (
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": message }),
        ),
        AuthError::Conflict { field } => (
            StatusCode::CONFLICT,
            serde_json::json!({ "error": err.to_string(), "field": field }),
        ),
        AuthError::InvalidCredentials | AuthError::Unauthenticated(_) => (
            StatusCode::UNAUTHORIZED,
            serde_json::json!({ "error": err.to_string() }),
        ),
        AuthError::StoreUnavailable { .. } | AuthError::Config(_) | AuthError::Internal(_) => {
            tracing::error!(error = ?err, "request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "error": "internal server error" }),
            )
        },
    }
}
