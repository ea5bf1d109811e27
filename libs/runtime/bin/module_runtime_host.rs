//! Standalone module runtime host
//!
//! Usage:
//!   module-runtime-host --config config/runtime.toml
//!   MODULE_RUNTIME_SOCKET_ADDRESS=localhost:1337 module-runtime-host --log-level debug

use anyhow::{Context, Result};
use clap::Parser;
use module_runtime::host::{connection_settings, middleware_address};
use module_runtime::modules::register_builtin_modules;
use module_runtime::{LifecycleState, ModuleFactory, ModuleManager};
use runtime_config::RuntimeConfig;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "module-runtime-host")]
#[command(about = "Hosts bundled modules and connects them to the middleware core")]
#[command(version)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level or filter directive; overrides the configuration
    #[arg(short, long)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = RuntimeConfig::load(args.config.as_deref())?;

    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    init_logging(
        args.log_level.as_deref().unwrap_or(&config.log_level),
        args.json_logs || config.json_logs,
    );

    info!(
        runtime = %config.runtime_name,
        socket_address = %config.socket_address,
        "Starting module runtime host"
    );

    let mut factory = ModuleFactory::new();
    register_builtin_modules(&mut factory)?;

    let address = middleware_address(&config)?;
    let manager = ModuleManager::new(factory, connection_settings(&config));
    let mut handle = manager
        .start(&address)
        .await
        .context("Failed to start module runtime")?;

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Received shutdown signal");
        }
        _ = handle.wait_for_state(LifecycleState::Stopping) => {
            info!("Runtime stopped on its own");
        }
    }

    handle.stop().await?;
    info!("Module runtime host exited");
    Ok(())
}

fn init_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
