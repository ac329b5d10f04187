//! Sofia Proxy CLI - Claude API relay for the Okul Asistanım frontend.

use clap::{Parser, Subcommand};
use sofia_proxy::api::create_router;
use sofia_proxy::config::Config;
use std::net::SocketAddr;
use tokio::signal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "sofia-proxy")]
#[command(about = "Claude API relay for the Okul Asistanım frontend")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Config file path
        #[arg(short, long)]
        config: Option<std::path::PathBuf>,
    },

    /// Show current configuration
    Config {
        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve { port, config }) => {
            run_server(port, config).await?;
        }
        Some(Commands::Config { path }) => {
            show_config(path)?;
        }
        None => {
            run_server(None, None).await?;
        }
    }

    Ok(())
}

async fn run_server(
    port_override: Option<u16>,
    config_path: Option<std::path::PathBuf>,
) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = match config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let config = config.with_env_overrides();

    if config.api_keys.claude.is_none() {
        // The server still starts; requests get the configuration-error
        // envelope and the key can be set without a restart.
        tracing::warn!("CLAUDE_API_KEY is not set; relay requests will be rejected");
    }

    let port = port_override.unwrap_or(config.gateway.port);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));

    let app = create_router(&config);

    println!("→ Sofia proxy starting on http://{}", addr);
    println!("→ Relay endpoint: http://{}/api/claude", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Relay listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    println!("\nRelay stopped.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

fn show_config(show_path: bool) -> anyhow::Result<()> {
    if show_path {
        println!("{}", Config::default_path().display());
        return Ok(());
    }

    let mut config = Config::load()?.with_env_overrides();
    // Never print the credential itself.
    if config.api_keys.claude.is_some() {
        config.api_keys.claude = Some("[configured]".to_string());
    }
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
