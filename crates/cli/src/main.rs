mod doctor_commands;
mod token_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    idgate_config::Severity,
    tracing::{error, info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "idgate", about = "idgate: signup, login and token validation service", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery of ./idgate.toml and ~/.config/idgate/).
    #[arg(long, global = true, env = "IDGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Address for the user surface (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,
    /// Port for the user surface (overrides config value).
    #[arg(long, global = true)]
    port: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start both HTTP surfaces (default when no subcommand is provided).
    Serve,
    /// Validate configuration and inspect the database.
    Doctor,
    /// Token utilities.
    Token {
        #[command(subcommand)]
        action: token_commands::TokenAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

async fn serve(cli: &Cli) -> anyhow::Result<()> {
    let mut config = idgate_config::load(cli.config.as_deref())?;

    // CLI args override config values
    if let Some(ref bind) = cli.bind {
        config.server.bind = bind.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let report = idgate_config::check_config(&config);
    for d in report.of(Severity::Warning) {
        warn!(path = %d.path, "{}", d.message);
    }
    if report.has_errors() {
        for d in report.of(Severity::Error) {
            error!(path = %d.path, "{}", d.message);
        }
        anyhow::bail!(
            "refusing to start with {} configuration error(s); run `idgate doctor` for details",
            report.count(Severity::Error)
        );
    }

    idgate_gateway::server::start(config).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let mut cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "idgate starting");

    match cli.command.take() {
        None | Some(Commands::Serve) => serve(&cli).await,
        Some(Commands::Doctor) => doctor_commands::handle_doctor(cli.config.as_deref()).await,
        Some(Commands::Token { action }) => {
            token_commands::handle_token(action, cli.config.as_deref())
        },
    }
}
