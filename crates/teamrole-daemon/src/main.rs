//! teamroled - keeps roster teams mirrored onto directory roles

use clap::Parser;
use teamrole_daemon::error::{DaemonError, DaemonResult};
use teamrole_daemon::{DaemonConfig, Server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// teamrole daemon CLI
#[derive(Parser)]
#[command(name = "teamroled")]
#[command(about = "Mirror roster teams onto directory roles", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "TEAMROLE_CONFIG")]
    config: Option<String>,

    /// Status API listen address
    #[arg(short, long, env = "TEAMROLE_LISTEN_ADDR")]
    listen: Option<String>,

    /// Log level
    #[arg(long, env = "TEAMROLE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "TEAMROLE_LOG_JSON")]
    json: bool,

    /// Use in-memory collaborators instead of the configured ones
    #[arg(long)]
    dev: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = if cli.dev {
        DaemonConfig::development()
    } else {
        DaemonConfig::load(cli.config.as_deref()).map_err(|e| DaemonError::Config(e.to_string()))?
    };

    // Override with CLI args
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if cli.json {
        config.logging.json = true;
    }
    if let Some(listen) = cli.listen {
        config.api.listen_addr = listen
            .parse()
            .map_err(|e| DaemonError::Config(format!("Invalid listen address: {}", e)))?;
    }

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        guild_id = %config.guild_id,
        red = %config.teams.red.team,
        blue = %config.teams.blue.team,
        "Starting teamrole daemon"
    );

    let server = Server::new(config).await?;
    server.run().await
}
