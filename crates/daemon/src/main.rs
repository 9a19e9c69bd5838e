// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Horizon Daemon (horizond)
//!
//! Owns the event queue, the trigger registry and the worker pool.

use std::path::PathBuf;

use hz_daemon::lifecycle::{self, LifecycleError};
use hz_daemon::logging::{rotate_log_if_needed, setup_logging, write_startup_error, write_startup_marker};
use hz_daemon::Config;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_help() {
    println!("horizond {VERSION}");
    println!("Horizon Daemon - executes functions for queued trigger events");
    println!();
    println!("USAGE:");
    println!("    horizond [--config <path>]");
    println!();
    println!("OPTIONS:");
    println!("    -c, --config <path>    Config file (default: $HORIZON_CONFIG or <state>/horizond.toml)");
    println!("    -h, --help             Print help information");
    println!("    -v, --version          Print version information");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle info flags before any config/lock acquisition
    let mut config_path = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("horizond {VERSION}");
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                print_help();
                return Ok(());
            }
            "--config" | "-c" => match args.next() {
                Some(path) => config_path = Some(PathBuf::from(path)),
                None => {
                    eprintln!("error: --config requires a path");
                    std::process::exit(1);
                }
            },
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: horizond [--config <path>] [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = Config::load(config_path)?;

    rotate_log_if_needed(&config.log_path);
    write_startup_marker(&config)?;
    let log_guard = setup_logging(&config)?;

    info!("Starting daemon");

    let mut daemon = match lifecycle::startup(&config).await {
        Ok(daemon) => daemon,
        Err(LifecycleError::LockFailed(_)) => {
            let pid = std::fs::read_to_string(&config.lock_path)
                .unwrap_or_default()
                .trim()
                .to_string();
            eprintln!("horizond is already running");
            if !pid.is_empty() {
                eprintln!("  pid: {pid}");
            }
            std::process::exit(1);
        }
        Err(e) => {
            write_startup_error(&config, &e);
            error!("Failed to start daemon: {}", e);
            drop(log_guard);
            return Err(e.into());
        }
    };

    let mut alerts = daemon.alerts();
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!(socket = %config.socket_path.display(), "Daemon ready");
    println!("READY");

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
                break;
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down...");
                break;
            }
            Some(alert) = recv_alert(&mut alerts) => {
                warn!(%alert, "worker slot retired");
                if lifecycle::pool_exhausted(&daemon.status()) {
                    error!("every worker slot is retired, shutting down");
                    break;
                }
            }
        }
    }

    let status = daemon.shutdown().await;
    info!(crashes = status.crashes, "Daemon stopped");
    Ok(())
}

/// Next alert, or never once the channel is gone.
async fn recv_alert(
    alerts: &mut Option<tokio::sync::mpsc::UnboundedReceiver<hz_engine::FatalAlert>>,
) -> Option<hz_engine::FatalAlert> {
    match alerts {
        Some(rx) => match rx.recv().await {
            Some(alert) => Some(alert),
            None => {
                *alerts = None;
                std::future::pending().await
            }
        },
        None => std::future::pending().await,
    }
}
