use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{
    env_subst::substitute_env,
    error::{Context, Result},
    schema::IdgateConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["idgate.toml", "idgate.yaml", "idgate.yml", "idgate.json"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<IdgateConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Load the effective config: the explicit file when given (errors are
/// fatal), otherwise the discovered one, then environment overrides.
pub fn load(explicit: Option<&Path>) -> Result<IdgateConfig> {
    let mut config = match explicit {
        Some(path) => load_config(path)?,
        None => discover_and_load(),
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./idgate.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/idgate/idgate.{toml,yaml,yml,json}` (user-global)
///
/// Returns `IdgateConfig::default()` if no config file is found.
pub fn discover_and_load() -> IdgateConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    IdgateConfig::default()
}

/// Find the first config file in standard locations.
pub(crate) fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/idgate/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "idgate").map(|d| d.config_dir().to_path_buf())
}

/// Overlay process environment variables onto a loaded config.
///
/// | variable              | field                  |
/// |-----------------------|------------------------|
/// | `IDGATE_JWT_KEY`      | `auth.signing_key`     |
/// | `IDGATE_SERVICE_KEY`  | `trust.service_key`    |
/// | `IDGATE_TRUST_OPEN`   | `trust.allow_open`     |
/// | `IDGATE_DATABASE_URL` | `database.url`         |
/// | `IDGATE_PORT`         | `server.port`          |
/// | `IDGATE_BACKEND_PORT` | `backend.port`         |
/// | `IDGATE_NOTIFY_URL`   | `notify.url`           |
pub fn apply_env_overrides(config: &mut IdgateConfig) {
    apply_env_overrides_with(config, |name| std::env::var(name).ok());
}

pub(crate) fn apply_env_overrides_with(
    config: &mut IdgateConfig,
    lookup: impl Fn(&str) -> Option<String>,
) {
    let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(key) = non_empty("IDGATE_JWT_KEY") {
        config.auth.signing_key = Some(Secret::new(key));
    }
    if let Some(key) = non_empty("IDGATE_SERVICE_KEY") {
        config.trust.service_key = Some(Secret::new(key));
    }
    if let Some(open) = non_empty("IDGATE_TRUST_OPEN") {
        config.trust.allow_open = matches!(open.trim(), "1" | "true" | "yes");
    }
    if let Some(url) = non_empty("IDGATE_DATABASE_URL") {
        config.database.url = url;
    }
    if let Some(url) = non_empty("IDGATE_NOTIFY_URL") {
        config.notify.url = Some(url);
    }
    for (name, slot) in [
        ("IDGATE_PORT", &mut config.server.port),
        ("IDGATE_BACKEND_PORT", &mut config.backend.port),
    ] {
        if let Some(raw) = non_empty(name) {
            match raw.trim().parse::<u16>() {
                Ok(port) => *slot = port,
                Err(_) => warn!(var = name, value = %raw, "ignoring non-numeric port override"),
            }
        }
    }
}

fn parse_config(raw: &str, path: &Path) -> Result<IdgateConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");
    let shown = path.display();

    match ext {
        "toml" => toml::from_str(raw).with_context(|| format!("invalid TOML in {shown}")),
        "yaml" | "yml" => {
            serde_yaml::from_str(raw).with_context(|| format!("invalid YAML in {shown}"))
        },
        "json" => serde_json::from_str(raw).with_context(|| format!("invalid JSON in {shown}")),
        _ => Err(crate::error::Error::message(format!(
            "unsupported config format: .{ext}"
        ))),
    }
}
