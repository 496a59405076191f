//! Main entry point for the League Link join agent
//!
//! Runs the agent with its status poller and local control server until a
//! shutdown signal arrives, or performs a single status check or join from
//! the command line.

use anyhow::{Context, Result};
use clap::Parser;
use league_link::config::{validate_config, AppConfig};
use league_link::service::AppState;
use league_link::types::Password;
use std::io::BufRead;
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info, warn};

/// League Link - join password-protected custom games
#[derive(Parser)]
#[command(
    name = "league-link",
    version,
    about = "Background agent that joins password-protected custom lobbies",
    long_about = "League Link watches the locally running game client, resolves lobby passwords \
                 through the matching service and drives the client into the matching custom \
                 lobby. A loopback control server exposes join, cancel, status and metrics."
)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Log level override
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// Enable debug mode
    #[arg(short, long, help = "Enable debug mode with verbose logging")]
    debug: bool,

    #[arg(long, value_name = "PORT", help = "Override control server port")]
    control_port: Option<u16>,

    #[arg(long, value_name = "URL", help = "Override matching service URL")]
    service_url: Option<String>,

    #[arg(long, value_name = "DIR", help = "Override game client install directory")]
    install_dir: Option<PathBuf>,

    /// Print one status snapshot and exit
    #[arg(long, help = "Check the local client status once and exit")]
    status: bool,

    /// Join once using a password read from stdin
    #[arg(
        long,
        conflicts_with = "status",
        help = "Read a lobby password from stdin, join once and exit"
    )]
    join: bool,

    /// Dry run mode (validate config and exit)
    #[arg(
        long,
        help = "Validate configuration and exit without starting the agent"
    )]
    dry_run: bool,
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Wait for shutdown signals (SIGINT, SIGTERM)
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C) signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

/// Display startup banner with service information
fn display_startup_banner(config: &AppConfig) {
    info!("🚀 League Link join agent");
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!(
        "   Control server: {}:{}",
        config.service.control_host, config.service.control_port
    );
    info!("   Matching service: {}", config.resolver.base_url);
    info!(
        "   Client lockfile: {}",
        config.client.lockfile_location().display()
    );
    info!(
        "   Status poll: every {}s",
        config.status_poll_interval().as_secs()
    );
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}

/// Load and merge configuration from environment, file and CLI arguments
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }

    if args.debug {
        config.service.log_level = "debug".to_string();
    }

    if let Some(port) = args.control_port {
        config.service.control_port = port;
    }

    if let Some(url) = &args.service_url {
        config.resolver.base_url = url.clone();
    }

    if let Some(dir) = &args.install_dir {
        config.client.install_dir = Some(dir.clone());
    }

    validate_config(&config)?;
    Ok(config)
}

/// Read one password line from stdin
fn read_password() -> Result<Password> {
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;
    Ok(Password::new(line))
}

async fn run_status(config: AppConfig) -> Result<()> {
    let app_state = AppState::new(config).await?;
    let snapshot = app_state.orchestrator().check_status().await;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

async fn run_join(config: AppConfig) -> Result<()> {
    let password = read_password()?;
    let app_state = AppState::new(config).await?;
    let result = app_state.orchestrator().join_game(password).await;

    println!("{}", serde_json::to_string_pretty(&result)?);
    if !result.ok {
        std::process::exit(1);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    });

    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if args.dry_run {
        info!("Configuration validation successful");
        display_startup_banner(&config);
        info!("Dry run completed - exiting without starting the agent");
        return Ok(());
    }

    if args.status {
        return run_status(config).await;
    }

    if args.join {
        return run_join(config).await;
    }

    display_startup_banner(&config);

    info!("Initializing agent components...");
    let mut app_state = match AppState::new(config.clone()).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = app_state.start().await {
        error!("Failed to start agent: {}", e);
        std::process::exit(1);
    }

    info!("✅ League Link is running");
    info!("Press Ctrl+C to shutdown gracefully...");

    wait_for_shutdown_signal().await;

    info!("🛑 Shutdown signal received, beginning graceful shutdown...");

    match tokio::time::timeout(config.shutdown_timeout(), app_state.shutdown()).await {
        Ok(Ok(())) => info!("✅ Graceful shutdown completed successfully"),
        Ok(Err(e)) => warn!("Shutdown finished with errors: {}", e),
        Err(_) => warn!("⚠️  Shutdown timeout exceeded, forcing exit"),
    }

    info!("🛑 League Link stopped");
    Ok(())
}
