//! HTTP surfaces over the credential engine.
//!
//! Two listeners share one `CredentialEngine`:
//! 1. the end-user surface under `/api/v1` (signup, login, validate, me)
//! 2. the backend surface under `/v1/auth`, gated by a shared service key
//!
//! Handlers only translate between JSON and engine calls; every rule lives
//! in `idgate-auth`.

pub mod auth_middleware;
pub mod backend_routes;
pub mod error;
pub mod server;
pub mod state;
pub mod user_routes;
