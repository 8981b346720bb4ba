//! mirrorwatch Daemon - Change-driven one-way mirroring service
//!
//! This binary runs in the foreground and handles:
//! - First-run bootstrap of an example configuration
//! - One watch session per configured definition
//! - Graceful shutdown on Enter, SIGINT, or SIGTERM
//!
//! # Architecture
//!
//! The daemon loads the YAML configuration, builds a single copy pipeline
//! (shared debouncer, local filesystem adapter) and hands every definition to
//! the `WatchCoordinator`. It then parks until a `CancellationToken` is
//! triggered by a signal or a line on stdin.

use std::io::BufRead;
use std::sync::Arc;

use anyhow::{Context, Result};
use mirrorwatch_core::config::{Config, ConfigSource, LoggingConfig};
use mirrorwatch_sync::{CopyPipeline, Debouncer, LocalFileSystemAdapter, WatchCoordinator};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Logging
// ============================================================================

/// Filter used when `RUST_LOG` is not set
fn fallback_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global tracing subscriber
///
/// `RUST_LOG` takes precedence over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback_filter(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

// ============================================================================
// Graceful shutdown
// ============================================================================

/// Waits for SIGTERM or SIGINT and cancels the token
///
/// Returns early when the token is cancelled from elsewhere (stdin).
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
        _ = token.cancelled() => {}
    }

    token.cancel();
}

/// Cancels `token` when a line is read from stdin
///
/// Reads on a plain thread: a blocking stdin read cannot be cancelled, and a
/// detached thread does not hold up process exit. End of input leaves the
/// token untouched so the daemon keeps running without a terminal.
fn spawn_stdin_listener(token: CancellationToken) {
    let spawned = std::thread::Builder::new()
        .name("stdin-listener".to_string())
        .spawn(move || {
            let mut line = String::new();
            match std::io::stdin().lock().read_line(&mut line) {
                Ok(0) => {}
                Ok(_) => {
                    info!("Enter pressed, shutting down");
                    token.cancel();
                }
                Err(e) => warn!(error = %e, "Failed to read stdin"),
            }
        });

    if let Err(e) = spawned {
        warn!(error = %e, "Failed to start stdin listener; use Ctrl+C to exit");
    }
}

// ============================================================================
// Main entry point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = Config::default_path();

    let config = match Config::load_or_bootstrap(&config_path) {
        Ok(ConfigSource::Loaded(config)) => config,
        Ok(ConfigSource::Created(path)) => {
            init_tracing(&LoggingConfig::default());
            info!(
                config_path = %path.display(),
                "Created example configuration; edit it and restart mirrorwatchd"
            );
            return Ok(());
        }
        Err(e) => {
            init_tracing(&LoggingConfig::default());
            error!(config_path = %config_path.display(), error = %e, "Failed to load configuration");
            return Err(e).context("Failed to load configuration");
        }
    };

    init_tracing(&config.logging);
    info!(
        config_path = %config_path.display(),
        watches = config.watches.len(),
        "mirrorwatch daemon starting (mirrorwatchd)"
    );

    let debouncer = Arc::new(Debouncer::default());
    let filesystem = Arc::new(LocalFileSystemAdapter::new());
    let pipeline = Arc::new(CopyPipeline::new(filesystem, debouncer));

    let coordinator = WatchCoordinator::start(config.watches, pipeline);
    if coordinator.session_count() == 0 {
        warn!("No valid watch definitions; nothing will be mirrored");
    }

    let shutdown_token = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown_token.clone()));
    spawn_stdin_listener(shutdown_token.clone());

    info!("Press Enter to exit");
    shutdown_token.cancelled().await;

    coordinator.shutdown();
    info!("mirrorwatch daemon shut down gracefully");
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
