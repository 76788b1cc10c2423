use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};

use idgate_auth::{IdentityClaims, TokenStatus};

use crate::{error::ApiError, state::AppState};

/// Extractor for the identity placed in request extensions by
/// [`require_auth`]. Rejects with 401 when the route is not behind it.
pub struct CurrentIdentity(pub IdentityClaims);

impl<S> FromRequestParts<S> for CurrentIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<IdentityClaims>()
            .cloned()
            .map(CurrentIdentity)
            .ok_or_else(|| ApiError::unauthenticated("not authenticated"))
    }
}

/// Middleware that requires a valid `Authorization: Bearer <token>` header.
///
/// On success the token's claims are inserted into request extensions.
pub async fn require_auth(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let Some(token) = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_bearer)
    else {
        return ApiError::unauthenticated("missing bearer token").into_response();
    };

    match state.engine.validate(token) {
        TokenStatus::Valid(claims) => {
            request.extensions_mut().insert(claims);
            next.run(request).await
        },
        TokenStatus::Invalid(reason) => ApiError::unauthenticated(reason.to_string()).into_response(),
    }
}

/// Extract the token from an `Authorization` header value. The scheme is
/// matched case-insensitively.
pub fn parse_bearer(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
