//! Main Entrypoint for the Bidichat Console
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment, with CLI overrides.
//! 2. Initializing logging (to stderr, so chat output owns stdout).
//! 3. Starting the session and running its event loop until quit.

use anyhow::Context;
use bidichat_console::{config::Config, session::Session};
use clap::Parser;
use tracing::info;

/// Real-time multimodal chat console.
#[derive(Parser, Debug)]
#[command(name = "bidichat", version)]
struct Cli {
    /// Server host to connect to.
    #[arg(long)]
    host: Option<String>,
    /// Server port.
    #[arg(long)]
    port: Option<u16>,
    /// User identifier used in the session URL.
    #[arg(long)]
    user: Option<String>,
    /// Connect over TLS (wss://).
    #[arg(long)]
    tls: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(user) = cli.user {
        config.user_id = user;
    }
    if cli.tls {
        config.use_tls = true;
    }

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();
    info!(
        host = %config.host,
        port = config.port,
        user = %config.user_id,
        "configuration loaded"
    );

    let session = Session::start(&config);
    session.run().await
}
