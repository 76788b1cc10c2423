use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};

use {
    idgate_auth::{AuthSession, IdentityClaims, InvalidReason, PublicUser, SignupRequest, TokenStatus},
    serde::{Deserialize, Serialize},
};

use crate::{
    auth_middleware::{CurrentIdentity, require_auth},
    error::ApiError,
    state::AppState,
};

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub token: String,
}

/// Public user fields as they appear on the wire.
#[derive(Debug, Serialize)]
pub struct UserBody {
    pub user_uuid: String,
    pub email: String,
    pub username: String,
    pub tenant_id: String,
    pub role: String,
}

impl From<PublicUser> for UserBody {
    fn from(user: PublicUser) -> Self {
        Self {
            user_uuid: user.id,
            email: user.email,
            username: user.username,
            tenant_id: user.tenant_id,
            role: user.role,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionBody {
    pub token: String,
    #[serde(flatten)]
    pub user: UserBody,
}

impl From<AuthSession> for SessionBody {
    fn from(session: AuthSession) -> Self {
        Self {
            token: session.token,
            user: session.user.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IdentityBody {
    pub user_uuid: String,
    pub tenant_id: String,
    pub role: String,
}

impl From<IdentityClaims> for IdentityBody {
    fn from(claims: IdentityClaims) -> Self {
        Self {
            user_uuid: claims.user_id,
            tenant_id: claims.tenant_id,
            role: claims.role,
        }
    }
}

/// Token validation outcome. Always sent with 200.
#[derive(Debug, Serialize)]
pub struct ValidateBody {
    pub valid: bool,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentityBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<InvalidReason>,
}

impl From<TokenStatus> for ValidateBody {
    fn from(status: TokenStatus) -> Self {
        match status {
            TokenStatus::Valid(claims) => Self {
                valid: true,
                identity: Some(claims.into()),
                reason: None,
            },
            TokenStatus::Invalid(reason) => Self {
                valid: false,
                identity: None,
                reason: Some(reason),
            },
        }
    }
}

// ── Router ───────────────────────────────────────────────────────────────────

/// End-user routes, relative to `/api/v1`.
pub fn user_router(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/auth/me", get(me_handler))
        .layer(middleware::from_fn_with_state(state, require_auth));

    Router::new()
        .route("/health", get(health_handler))
        .route("/auth/signup", post(signup_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/validate", post(validate_handler))
        .merge(protected)
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn signup_handler(
    State(state): State<AppState>,
    body: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;
    let session = state.engine.signup(req).await?;
    Ok((StatusCode::CREATED, Json(SessionBody::from(session))))
}

pub(crate) async fn login_handler(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<SessionBody>, ApiError> {
    let Json(req) = body?;
    let session = state.engine.login(&req.email, &req.password).await?;
    Ok(Json(session.into()))
}

pub(crate) async fn validate_handler(
    State(state): State<AppState>,
    body: Result<Json<ValidateRequest>, JsonRejection>,
) -> Result<Json<ValidateBody>, ApiError> {
    let Json(req) = body?;
    Ok(Json(state.engine.validate(&req.token).into()))
}

async fn me_handler(CurrentIdentity(claims): CurrentIdentity) -> Json<IdentityBody> {
    Json(claims.into())
}
