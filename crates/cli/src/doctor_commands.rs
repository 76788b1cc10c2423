//! `idgate doctor`: config validation and environment audit.
//!
//! Runs a series of checks against the local installation and prints a
//! structured report with `[ok]`, `[warn]`, `[fail]`, `[skip]`, or `[info]`
//! status indicators per item.

use std::path::{Path, PathBuf};

use {
    anyhow::Result,
    idgate_config::{
        IdgateConfig, Severity,
        validate::{self, Diagnostic},
    },
};

// ── ANSI helpers ────────────────────────────────────────────────────────────

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const DIM: &str = "\x1b[2m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Per-check result used to build the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Ok,
    Warn,
    Fail,
    Skip,
    Info,
}

impl Status {
    fn label(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Warn => "warn",
            Self::Fail => "fail",
            Self::Skip => "skip",
            Self::Info => "info",
        }
    }

    fn color(self) -> &'static str {
        match self {
            Self::Ok => GREEN,
            Self::Warn => YELLOW,
            Self::Fail => RED,
            Self::Skip => DIM,
            Self::Info => CYAN,
        }
    }
}

impl From<Severity> for Status {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Error => Self::Fail,
            Severity::Warning => Self::Warn,
            Severity::Info => Self::Info,
        }
    }
}

struct CheckItem {
    status: Status,
    message: String,
}

struct Section {
    title: String,
    items: Vec<CheckItem>,
}

impl Section {
    fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            items: Vec::new(),
        }
    }

    fn push(&mut self, status: Status, message: impl Into<String>) {
        self.items.push(CheckItem {
            status,
            message: message.into(),
        });
    }

    fn push_diagnostic(&mut self, d: &Diagnostic) {
        let msg = if d.path.is_empty() {
            d.message.clone()
        } else {
            format!("{}: {}", d.path, d.message)
        };
        self.push(d.severity.into(), msg);
    }
}

// ── Printing ────────────────────────────────────────────────────────────────

fn print_report(sections: &[Section]) -> (usize, usize) {
    let mut errors = 0usize;
    let mut warnings = 0usize;

    for section in sections {
        eprintln!("{BOLD}{}{RESET}", section.title);
        for item in &section.items {
            let color = item.status.color();
            let label = item.status.label();
            eprintln!("  [{color}{label}{RESET}]  {}", item.message);
            match item.status {
                Status::Fail => errors += 1,
                Status::Warn => warnings += 1,
                _ => {},
            }
        }
        eprintln!();
    }

    (errors, warnings)
}

// ── Entry point ─────────────────────────────────────────────────────────────

pub async fn handle_doctor(config_path: Option<&Path>) -> Result<()> {
    eprintln!("{BOLD}idgate doctor{RESET}");
    eprintln!("{BOLD}============={RESET}\n");

    let mut sections = vec![check_config_file(config_path)];

    match idgate_config::load(config_path) {
        Ok(config) => {
            sections.push(check_effective(&config));
            sections.push(check_database(&config.database.url).await);
        },
        Err(e) => {
            let mut section = Section::new("Effective config");
            section.push(Status::Fail, format!("failed to load config: {e}"));
            sections.push(section);
        },
    }

    let (errors, warnings) = print_report(&sections);
    eprintln!("{BOLD}Summary:{RESET} {errors} error(s), {warnings} warning(s)");

    if errors > 0 {
        anyhow::bail!("doctor found {errors} error(s)");
    }
    Ok(())
}

// ── 1. Config file ──────────────────────────────────────────────────────────

/// Syntax, unknown keys and types of the config file itself. Value checks
/// run in [`check_effective`], after environment overrides.
fn check_config_file(config_path: Option<&Path>) -> Section {
    let result = validate::validate(config_path);

    let Some(ref path) = result.config_path else {
        let mut section = Section::new("Config file");
        section.push(Status::Info, "no config file found; using defaults and environment");
        return section;
    };
    let mut section = Section::new(format!("Config file ({})", path.display()));

    if path.extension().is_some_and(|ext| ext != "toml") {
        section.push(Status::Skip, "schema check only covers TOML files");
        return section;
    }

    let file_level: Vec<_> = result
        .diagnostics
        .iter()
        .filter(|d| matches!(d.category, "syntax" | "unknown-field" | "type-error"))
        .collect();
    if file_level.is_empty() {
        section.push(Status::Ok, "TOML syntax valid, all fields recognized");
    }
    for d in file_level {
        section.push_diagnostic(d);
    }
    section
}

// ── 2. Effective config ─────────────────────────────────────────────────────

fn check_effective(config: &IdgateConfig) -> Section {
    let mut section = Section::new("Effective config");
    let result = idgate_config::check_config(config);

    if !result.has_errors() {
        section.push(Status::Ok, "server can start with this configuration");
    }
    for d in &result.diagnostics {
        section.push_diagnostic(d);
    }
    section
}

// ── 3. Database ─────────────────────────────────────────────────────────────

async fn check_database(url: &str) -> Section {
    let mut section = Section::new(format!("Database ({url})"));

    match sqlite_path(url) {
        None => {
            section.push(Status::Skip, "in-memory database; nothing to inspect");
            return section;
        },
        Some(path) if !path.exists() => {
            section.push(
                Status::Info,
                format!("{} does not exist yet; it is created on first start", path.display()),
            );
            return section;
        },
        Some(_) => {},
    }

    let pool = match idgate_auth::connect(url, 1).await {
        Ok(pool) => pool,
        Err(e) => {
            section.push(Status::Fail, format!("cannot open database: {e}"));
            return section;
        },
    };
    section.push(Status::Ok, "database opens");

    match sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
        .fetch_one(&pool)
        .await
    {
        Ok(count) => section.push(Status::Ok, format!("{count} user(s) registered")),
        Err(_) => section.push(
            Status::Warn,
            "users table missing; it is created on first start",
        ),
    }
    pool.close().await;
    section
}

/// File path of a SQLite URL, or `None` for in-memory databases.
fn sqlite_path(url: &str) -> Option<PathBuf> {
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    let rest = rest.split_once('?').map_or(rest, |(path, _)| path);
    if rest.is_empty() || rest == ":memory:" {
        return None;
    }
    Some(PathBuf::from(rest))
}
