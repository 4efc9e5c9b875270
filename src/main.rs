//! Show-control hub
//!
//! Receives OSC commands and fans them out to lighting, audio, video and
//! camera devices, with hub-side fades.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use showctl_hub::api::{self, ApiState};
use showctl_hub::config::AppConfig;
use showctl_hub::hub::Hub;
use showctl_hub::ingress::OscIngress;

/// Show-control hub - route OSC commands to show devices
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Validate the configuration, print the driver table and exit
    #[arg(long)]
    check_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_logging(&args.log_level, args.log_json)?;

    info!("Starting show-control hub v{}...", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = AppConfig::load(&args.config).await?;

    if args.check_config {
        print_config_summary(&config);
        return Ok(());
    }

    let hub = Arc::new(Hub::from_config(&config)?);
    info!("Hub initialized with {} driver(s)", config.drivers.len());

    run_app(Arc::clone(&hub), &config, shutdown_signal()).await?;

    hub.shutdown().await;
    info!("Show-control hub shutdown complete");
    Ok(())
}

async fn run_app(
    hub: Arc<Hub>,
    config: &AppConfig,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<()> {
    let mut tasks = Vec::new();

    match &config.hub.osc_listen {
        Some(addr) => {
            let ingress = OscIngress::bind(addr).await?;
            tasks.push(ingress.spawn(Arc::clone(&hub)));
        },
        None => warn!("OSC listener disabled (hub.osc_listen is null)"),
    }

    if config.api.enabled {
        let state = Arc::new(ApiState {
            hub: Arc::clone(&hub),
        });
        let bind = config.api.bind.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = api::start_server(state, &bind).await {
                error!("API server stopped: {:#}", e);
            }
        }));
    }

    hub.start().await;
    info!("✅ Hub running, press Ctrl+C to stop");

    shutdown.await;

    for task in tasks {
        task.abort();
    }
    Ok(())
}

fn print_config_summary(config: &AppConfig) {
    use colored::*;

    println!("\n{}", "=== Configuration OK ===".bold().green());
    println!(
        "  OSC listener: {}",
        config.hub.osc_listen.as_deref().unwrap_or("disabled").cyan()
    );
    println!("  Tick interval: {}ms", config.hub.tick_interval_ms);
    if config.api.enabled {
        println!("  API: http://{}", config.api.bind.cyan());
    } else {
        println!("  API: {}", "disabled".yellow());
    }

    println!("\n{}", "Drivers:".bold());
    if config.drivers.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for driver in &config.drivers {
        println!(
            "  /{:<12} {:<10} {:<9} {}",
            driver.prefix().yellow(),
            driver.name(),
            driver.kind.to_string(),
            driver.target().cyan()
        );
    }
    println!();
}

fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(false))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_thread_names(false),
            )
            .init();
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install CTRL+C signal handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
