// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plot job tracker daemon (plotd)
//!
//! Tracks plotting jobs and devices and streams their events to clients.

use std::path::PathBuf;

use plot_daemon::lifecycle::{self, LifecycleError, Paths};
use plot_daemon::Config;
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Optional config file path
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;
    let paths = Paths::for_config(&config)?;

    // Write startup marker to log (before tracing setup)
    write_startup_marker(&paths)?;

    let log_guard = setup_logging(&paths)?;

    info!(listen = %config.listen, "starting plotd");

    let mut daemon = match lifecycle::startup(&config, &paths).await {
        Ok(d) => d,
        Err(e) => {
            // The non-blocking writer may drop this line on exit
            write_startup_error(&paths, &e);
            error!("failed to start daemon: {}", e);
            drop(log_guard);
            return Err(e.into());
        }
    };

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    daemon.spawn();
    info!(addr = %daemon.local_addr(), "daemon ready");
    println!("READY {}", daemon.local_addr());

    let mut snapshots = tokio::time::interval(config.snapshot_interval);
    snapshots.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    snapshots.tick().await;

    loop {
        tokio::select! {
            _ = snapshots.tick() => {
                if let Err(e) = daemon.write_snapshot() {
                    warn!(error = %e, "snapshot failed");
                }
            }

            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
                break;
            }

            _ = sigint.recv() => {
                info!("received SIGINT, shutting down");
                break;
            }
        }
    }

    daemon.shutdown().await?;
    info!("daemon stopped");
    Ok(())
}

/// First line each daemon run appends to its log, e.g.
/// `--- plotd: starting (pid: 12345)`
pub const STARTUP_MARKER_PREFIX: &str = "--- plotd: starting (pid: ";

/// Mark the start of this run in the log before tracing owns the file
fn write_startup_marker(paths: &Paths) -> Result<(), LifecycleError> {
    use std::io::Write;

    std::fs::create_dir_all(&paths.state_dir)?;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&paths.log_path)?;
    writeln!(file, "{}{})", STARTUP_MARKER_PREFIX, std::process::id())?;

    Ok(())
}

/// Append a startup failure directly to the log
fn write_startup_error(paths: &Paths, error: &LifecycleError) {
    use std::io::Write;

    let Ok(mut file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&paths.log_path)
    else {
        return;
    };
    let _ = writeln!(file, "ERROR failed to start daemon: {}", error);
}

fn setup_logging(
    paths: &Paths,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let dir = paths.log_path.parent().ok_or(LifecycleError::NoStateDir)?;
    let name = paths.log_path.file_name().ok_or(LifecycleError::NoStateDir)?;
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));

    // RUST_LOG overrides the default level
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .init();

    Ok(guard)
}
