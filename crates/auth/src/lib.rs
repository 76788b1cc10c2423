//! Credential lifecycle for idgate.
//!
//! This crate provides:
//! - `CredentialEngine`: signup, login, token validation and identity lookup
//! - `SqliteUserStore`: user records with atomic uniqueness on email and username
//! - `TokenCodec`: HS256 session tokens with a fixed lifetime
//! - `TrustGate`: shared-secret check for backend callers
//! - `NotificationSink`: best-effort "user created" delivery

pub mod engine;
pub mod error;
pub mod model;
pub mod notify;
pub mod password;
pub mod store;
pub mod token;
pub mod trust;

pub use {
    engine::{CredentialEngine, SignupPolicy},
    error::{AuthError, ConflictField, Result},
    model::{AuthSession, IdentityClaims, Profile, PublicUser, SignupRequest, User},
    notify::{HttpNotificationSink, NotificationSink, UserCreated},
    store::{SqliteUserStore, UserStore, connect},
    token::{DEFAULT_TTL, InvalidReason, TokenCodec, TokenStatus},
    trust::{SERVICE_KEY_HEADER, TrustGate},
};
