//! Agentflow server binary
//!
//! Loads layered configuration, initializes tracing and serves the JSON API
//! until Ctrl+C or SIGTERM.

use agentflow_server::{
    config::{Config, LogFormat},
    server::Server,
    Result,
};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Agentflow workflow engine server
#[derive(Parser)]
#[command(name = "agentflow")]
#[command(about = "Workflow engine coordinating agents into dependency-driven pipelines")]
#[command(version)]
struct Cli {
    /// Override server host
    #[arg(long)]
    host: Option<String>,

    /// Override server port
    #[arg(long)]
    port: Option<u16>,

    /// Path to an additional configuration file
    #[arg(long)]
    config: Option<String>,

    /// Override the log filter, e.g. `debug` or `agentflow_core=trace`
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    apply_cli_overrides(&mut config, &cli);

    init_tracing(&config);
    info!(
        database = %db_scheme(&config.database.url),
        "Configuration loaded successfully"
    );

    let server = Server::new(config).await.map_err(|e| {
        error!("Failed to initialize server: {}", e);
        e
    })?;

    if let Err(e) = server.run().await {
        error!("Server error: {}", e);
        return Err(e);
    }

    info!("Agentflow server shut down gracefully");
    Ok(())
}

/// Apply CLI argument overrides to configuration
fn apply_cli_overrides(config: &mut Config, cli: &Cli) {
    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
}

/// `RUST_LOG` wins over the configured level
fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let registry = tracing_subscriber::registry().with(filter);

    match config.logging.format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Database kind for logging without leaking paths or credentials
fn db_scheme(url: &str) -> &'static str {
    if url.contains(":memory:") {
        "SQLite (in-memory)"
    } else if url.starts_with("sqlite:") {
        "SQLite"
    } else {
        "Unknown DB"
    }
}
