//! Configuration validation engine.
//!
//! Two passes: [`validate_toml_str`] checks raw file text for syntax errors
//! and unknown/misspelled fields, [`check_config`] checks the effective
//! config (after env overrides) for values the server refuses to start with.

use std::{collections::HashMap, path::Path};

use secrecy::ExposeSecret;

use crate::schema::IdgateConfig;

/// Signing keys shorter than this many bytes earn a warning.
const MIN_RECOMMENDED_KEY_BYTES: usize = 32;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "type-error", "security", "value"
    pub category: &'static str,
    /// Dotted path, e.g. "auth.signing_key"
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn new(
        severity: Severity,
        category: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<std::path::PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    /// Diagnostics at the given severity, in insertion order.
    pub fn of(&self, severity: Severity) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(move |d| d.severity == severity)
    }
}

// ── Schema tree for unknown-field detection ─────────────────────────────────

/// Represents the expected shape of the configuration schema.
enum KnownKeys {
    Struct(HashMap<&'static str, KnownKeys>),
    Array,
    Leaf,
}

/// Build the full schema map mirroring every field in `schema.rs`.
fn build_schema_map() -> KnownKeys {
    use KnownKeys::{Array, Leaf, Struct};

    let listener = || Struct(HashMap::from([("bind", Leaf), ("port", Leaf)]));

    Struct(HashMap::from([
        ("server", listener()),
        (
            "backend",
            Struct(HashMap::from([
                ("enabled", Leaf),
                ("bind", Leaf),
                ("port", Leaf),
            ])),
        ),
        (
            "database",
            Struct(HashMap::from([("url", Leaf), ("max_connections", Leaf)])),
        ),
        (
            "auth",
            Struct(HashMap::from([
                ("signing_key", Leaf),
                ("token_ttl_secs", Leaf),
                ("default_tenant", Leaf),
                ("default_role", Leaf),
                ("min_password_len", Leaf),
                ("store_timeout_ms", Leaf),
            ])),
        ),
        (
            "trust",
            Struct(HashMap::from([("service_key", Leaf), ("allow_open", Leaf)])),
        ),
        (
            "notify",
            Struct(HashMap::from([
                ("url", Leaf),
                ("service_key", Leaf),
                ("timeout_ms", Leaf),
            ])),
        ),
        ("cors", Struct(HashMap::from([("allowed_origins", Array)]))),
    ]))
}

// ── Levenshtein distance ────────────────────────────────────────────────────

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let b_len = b.chars().count();
    if a.is_empty() {
        return b_len;
    }
    if b.is_empty() {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.chars().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_len]
}

/// Find the closest of `candidates` within `max_distance` edits.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|&c| (c, levenshtein(needle, c)))
        .filter(|&(_, d)| d > 0 && d <= max_distance)
        .min_by_key(|&(_, d)| d)
        .map(|(c, _)| c)
}

// ── File validation ─────────────────────────────────────────────────────────

/// Validate a config file at the given path, or the discovered one if `path`
/// is `None`. Semantic checks run on the parsed file content.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => crate::loader::find_config_file(),
    };

    let Some(ref actual_path) = config_path else {
        return ValidationResult {
            diagnostics: vec![Diagnostic::new(
                Severity::Info,
                "file-ref",
                "",
                "no config file found; using defaults",
            )],
            config_path: None,
        };
    };

    match std::fs::read_to_string(actual_path) {
        Ok(content) => {
            let mut result = validate_toml_str(&crate::env_subst::substitute_env(&content));
            result.config_path = Some(actual_path.clone());
            result
        },
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic::new(
                Severity::Error,
                "syntax",
                "",
                format!("failed to read config file: {e}"),
            )],
            config_path: Some(actual_path.clone()),
        },
    }
}

/// Validate TOML text without touching the file system.
#[must_use]
pub fn validate_toml_str(toml_str: &str) -> ValidationResult {
    let mut diagnostics = Vec::new();

    let toml_value: toml::Value = match toml::from_str(toml_str) {
        Ok(v) => v,
        Err(e) => {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                "syntax",
                "",
                format!("TOML syntax error: {e}"),
            ));
            return ValidationResult {
                diagnostics,
                config_path: None,
            };
        },
    };

    check_unknown_fields(&toml_value, &build_schema_map(), "", &mut diagnostics);

    match toml::from_str::<IdgateConfig>(toml_str) {
        Ok(config) => diagnostics.extend(check_config(&config).diagnostics),
        Err(e) => diagnostics.push(Diagnostic::new(
            Severity::Error,
            "type-error",
            "",
            format!("type error: {e}"),
        )),
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

/// Walk the TOML value tree against the schema tree and flag unknown keys.
fn check_unknown_fields(
    value: &toml::Value,
    schema: &KnownKeys,
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let (toml::Value::Table(table), KnownKeys::Struct(fields)) = (value, schema) else {
        return;
    };
    let known_keys: Vec<&str> = fields.keys().copied().collect();
    for (key, child_value) in table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        if let Some(child_schema) = fields.get(key.as_str()) {
            check_unknown_fields(child_value, child_schema, &path, diagnostics);
            continue;
        }
        let level = if prefix.is_empty() {
            " at top level"
        } else {
            ""
        };
        let message = match suggest(key, &known_keys, 3) {
            Some(s) => format!("unknown field{level} (did you mean \"{s}\"?)"),
            None => format!("unknown field{level}"),
        };
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "unknown-field",
            path,
            message,
        ));
    }
}

// ── Effective config checks ─────────────────────────────────────────────────

/// Check an effective config for values the server refuses to start with
/// (errors) or that deserve an operator's attention (warnings).
#[must_use]
pub fn check_config(config: &IdgateConfig) -> ValidationResult {
    let mut d = Vec::new();

    match config.auth.signing_key.as_ref().map(|k| k.expose_secret()) {
        None => d.push(Diagnostic::new(
            Severity::Error,
            "security",
            "auth.signing_key",
            "no token signing key configured (set auth.signing_key or IDGATE_JWT_KEY)",
        )),
        Some(k) if k.trim().is_empty() => d.push(Diagnostic::new(
            Severity::Error,
            "security",
            "auth.signing_key",
            "token signing key is empty",
        )),
        Some(k) if k.len() < MIN_RECOMMENDED_KEY_BYTES => d.push(Diagnostic::new(
            Severity::Warning,
            "security",
            "auth.signing_key",
            format!(
                "token signing key is {} bytes; at least {MIN_RECOMMENDED_KEY_BYTES} recommended",
                k.len()
            ),
        )),
        Some(_) => {},
    }

    if config.auth.token_ttl_secs == 0 {
        d.push(Diagnostic::new(
            Severity::Error,
            "value",
            "auth.token_ttl_secs",
            "token lifetime must be greater than zero",
        ));
    }
    if config.auth.default_tenant.trim().is_empty() || config.auth.default_role.trim().is_empty()
    {
        d.push(Diagnostic::new(
            Severity::Error,
            "value",
            "auth",
            "default_tenant and default_role must not be empty",
        ));
    }
    if config.database.max_connections == 0 {
        d.push(Diagnostic::new(
            Severity::Error,
            "value",
            "database.max_connections",
            "pool needs at least one connection",
        ));
    }

    if config.backend.enabled {
        if config.backend.port == 0 || config.server.port == 0 {
            d.push(Diagnostic::new(
                Severity::Error,
                "value",
                "backend.port",
                "server.port and backend.port must be set when the backend listener is enabled",
            ));
        } else if config.backend.port == config.server.port
            && config.backend.bind == config.server.bind
        {
            d.push(Diagnostic::new(
                Severity::Error,
                "value",
                "backend.port",
                format!("backend listener collides with server listener on port {}", config.server.port),
            ));
        }
        check_trust(config, &mut d);
    }

    if config.notify.url.is_none() {
        d.push(Diagnostic::new(
            Severity::Info,
            "value",
            "notify.url",
            "user-created notifications are disabled",
        ));
    }

    ValidationResult {
        diagnostics: d,
        config_path: None,
    }
}

fn check_trust(config: &IdgateConfig, d: &mut Vec<Diagnostic>) {
    let key = config
        .trust
        .service_key
        .as_ref()
        .map(|k| k.expose_secret())
        .filter(|k| !k.trim().is_empty());

    match (key, config.trust.allow_open) {
        (None, false) => d.push(Diagnostic::new(
            Severity::Error,
            "security",
            "trust.service_key",
            "backend listener has no service key; set trust.service_key or opt in with trust.allow_open = true",
        )),
        (None, true) => d.push(Diagnostic::new(
            Severity::Warning,
            "security",
            "trust.allow_open",
            format!(
                "backend calls on {}:{} are accepted without a service key",
                config.backend.bind, config.backend.port
            ),
        )),
        (Some(_), true) => d.push(Diagnostic::new(
            Severity::Warning,
            "security",
            "trust.allow_open",
            "ignored because trust.service_key is set",
        )),
        (Some(_), false) => {},
    }
}
