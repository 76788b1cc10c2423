//! Configuration loading, validation, env substitution, and env overrides.
//!
//! Config files: `idgate.toml`, `idgate.yaml`, or `idgate.json`
//! Searched in `./` then `~/.config/idgate/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{apply_env_overrides, config_dir, discover_and_load, load, load_config},
    schema::{
        AuthConfig, BackendConfig, CorsConfig, DatabaseConfig, IdgateConfig, NotifyConfig,
        ServerConfig, TrustConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, check_config},
};
