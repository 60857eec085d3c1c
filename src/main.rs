//! herakles-lowmem-killer - version 0.1.0
//!
//! Memory-pressure driven process eviction daemon with tracing logging.
//! This is the main entry point that wires the policy engine to the host,
//! starts the background loops and the operator API, and handles subcommands.

mod cgroup;
mod cli;
mod commands;
mod config;
mod daemon;
mod handlers;
mod linux_host;
mod metrics;
mod process;
mod startup_checks;
mod state;
mod system;

use anyhow::Context;
use axum::{
    routing::{get, post, put},
    Router,
};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{net::TcpListener, signal, sync::watch};
use tracing::level_filters::LevelFilter;
use tracing::{error, info, warn};

use cli::{Args, Commands, LogLevel};
use commands::{command_check, command_config, command_simulate};
use config::{
    resolve_config, show_config, validate_effective_config, Config, DEFAULT_BIND_ADDR, DEFAULT_PORT,
};
use handlers::{
    config_handler, health_handler, metrics_handler, put_boost_handler, put_debug_level_handler,
    put_reclaim_handler, put_scan_handler, put_thresholds_handler, reclaim_cancel_handler,
    reclaim_disable_handler, reclaim_enable_handler, reclaim_request_handler, root_handler,
    stats_handler,
};
use state::{AppState, SharedAppState};

/// Initializes tracing logging subsystem with configured log level.
fn setup_logging(args: &Args) -> anyhow::Result<()> {
    let log_level = match args.log_level {
        LogLevel::Off => LevelFilter::OFF,
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Trace => LevelFilter::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Logging initialized with level: {:?}", args.log_level);
    Ok(())
}

/// Helper function to load and validate configuration.
fn load_validated_config(args: &Args) -> anyhow::Result<Config> {
    let config = resolve_config(args)?;
    validate_effective_config(&config).context("Configuration invalid")?;
    Ok(config)
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

fn router(state: SharedAppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/config", get(config_handler))
        .route("/config/thresholds", put(put_thresholds_handler))
        .route("/config/boost", put(put_boost_handler))
        .route("/config/scan", put(put_scan_handler))
        .route("/config/reclaim", put(put_reclaim_handler))
        .route("/config/debug_level", put(put_debug_level_handler))
        .route("/stats", get(stats_handler))
        .route("/reclaim/request", post(reclaim_request_handler))
        .route("/reclaim/cancel", post(reclaim_cancel_handler))
        .route("/reclaim/enable", post(reclaim_enable_handler))
        .route("/reclaim/disable", post(reclaim_disable_handler))
        .with_state(state)
}

/// Runs the daemon until a shutdown signal arrives.
async fn run_daemon(config: Config) -> anyhow::Result<()> {
    info!("Starting herakles-lowmem-killer");

    let proc_root = config.proc_root();
    let dry_run = config.dry_run.unwrap_or(false);
    if let Err(e) =
        startup_checks::validate_requirements(&proc_root, &config.reclaim.cgroups, dry_run)
    {
        error!("❌ Startup validation failed: {}", e);
        error!("   The daemon will start but may not function correctly!");
    }
    if dry_run {
        warn!("Dry-run mode: victims are logged, never signaled");
    }

    let bind_ip_str = config
        .bind
        .clone()
        .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
    let port = config.port.unwrap_or(DEFAULT_PORT);

    let state: SharedAppState = Arc::new(AppState::build(config)?);
    let table = state.coordinator.table();
    info!(
        adj = ?table.cutoffs(),
        minfree = ?table.min_free(),
        victims = state.coordinator.scan_tunables().victims_per_scan,
        "policy engine ready"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let tasks = daemon::spawn_all(&state, &shutdown_rx);

    // Configure HTTP server routes
    let addr: SocketAddr = format!("{}:{}", bind_ip_str, port).parse()?;
    let app = router(Arc::clone(&state));

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("herakles-lowmem-killer listening on http://{}:{}", bind_ip_str, port);

    let server = axum::serve(listener, app);
    let result = tokio::select! {
        result = server => {
            result.map_err(|e| {
                error!("Server error: {}", e);
                anyhow::Error::from(e)
            })
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, exiting...");
            Ok(())
        }
    };

    // The receiver side may already be gone if every task exited.
    let _ = shutdown_tx.send(true);
    for task in tasks {
        if let Err(e) = task.await {
            warn!("background task ended abnormally: {}", e);
        }
    }

    info!("herakles-lowmem-killer stopped gracefully");
    result
}

/// Main application entry point.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            validate_effective_config(&config).context("Configuration invalid")?;
            println!("✅ Configuration is valid");
            return Ok(());
        }

        return show_config(&config, args.config_format);
    }

    setup_logging(&args)?;

    // Handle subcommands
    if let Some(command) = &args.command {
        // Config generation does not depend on the effective config
        if let Commands::Config {
            output,
            format,
            commented,
        } = command
        {
            return command_config(output.clone(), *format, *commented);
        }

        let config = load_validated_config(&args)?;

        return match command {
            Commands::Check {
                memory,
                proc,
                cgroups,
                all,
            } => command_check(*memory, *proc, *cgroups, *all, &config),

            Commands::Simulate {
                iterations,
                processes,
                seed,
                step_ms,
                verbose,
            } => command_simulate(&config, *iterations, *processes, *seed, *step_ms, *verbose),

            Commands::CheckRequirements => {
                println!("🔍 Checking Runtime Requirements");
                println!("================================\n");

                startup_checks::validate_requirements(
                    &config.proc_root(),
                    &config.reclaim.cgroups,
                    config.dry_run.unwrap_or(false),
                )
                .context("Requirements check failed")?;
                println!("\n✅ All requirements met - ready for production!");
                Ok(())
            }

            Commands::Config { .. } => Ok(()),
        };
    }

    let config = load_validated_config(&args)?;
    run_daemon(config).await
}
