// Quota Governor - Main Entry Point
//
// Runs the multi-tenant request governor:
// - CLI interface
// - Background scheduler (daily reset, idempotency sweep)
// - HTTP endpoint for metrics, health and governor state

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use quota_governor::config::Config;
use quota_governor::governor::{plans, BroadcastPublisher, Governor, StaticTenantDirectory};
use quota_governor::metrics_server;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// Quota Governor: plan quotas, rate limits and idempotent replay
#[derive(Parser, Debug)]
#[command(name = "quota-governor")]
#[command(author = "Quota Governor Contributors")]
#[command(version)]
#[command(about = "Multi-tenant request governor", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the governor, its scheduler and the HTTP endpoint
    Serve {
        /// Port for the HTTP endpoint (overrides metrics.port)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print the plan table as JSON
    Plans,
    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    init_tracing(&config, args.verbose)?;

    match args.command {
        Some(Commands::Serve { port }) => serve(config, port).await?,
        Some(Commands::Plans) => print_plans()?,
        Some(Commands::Config) => print_config(&config)?,
        None => {
            info!("No command specified. Use \"quota-governor --help\" for usage.");
        }
    }

    Ok(())
}

fn init_tracing(config: &Config, verbose: bool) -> Result<()> {
    let level = if verbose {
        Level::DEBUG
    } else {
        config.log_level()?
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    // Logs go to stderr so `plans` and `config` output stays parseable
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match config.logging.format.to_lowercase().as_str() {
        "json" => builder.json().init(),
        "pretty" => builder.pretty().init(),
        _ => builder.compact().init(),
    }

    Ok(())
}

async fn serve(config: Config, port: Option<u16>) -> Result<()> {
    let port = port.unwrap_or(config.metrics.port);

    let directory = StaticTenantDirectory::from_entries(config.tenants.clone());
    let publisher = BroadcastPublisher::default();
    let governor = Governor::new(
        config.governor.clone(),
        Arc::new(directory),
        Arc::new(publisher),
    );

    info!(
        tenants = config.tenants.len(),
        port,
        "Quota governor v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    let scheduler = governor.start_scheduler();

    tokio::select! {
        result = metrics_server::start_server(port, governor.clone(), config.metrics.enabled) => {
            result?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            info!("Shutdown signal received");
        }
    }

    scheduler.shutdown().await;
    Ok(())
}

fn print_plans() -> Result<()> {
    let json = serde_json::to_string_pretty(&plans::all_plans())
        .context("Failed to serialize plan table")?;
    println!("{}", json);
    Ok(())
}

fn print_config(config: &Config) -> Result<()> {
    let toml = toml::to_string_pretty(config).context("Failed to serialize configuration")?;
    println!("{}", toml);
    Ok(())
}
