// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup, shutdown, recovery.

use std::fs::File;
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;
use plot_core::{Clock, EventBus, SystemClock, UuidIdGen};
use plot_engine::{EngineDeps, Service};
use plot_storage::{Availability, DeviceRegistry, JobStore, Reconciled, Snapshotter, StoreError};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{Config, ConfigError};
use crate::server::{ConnectionManager, ServerConfig};

pub type DaemonService = Service<SystemClock, UuidIdGen>;
pub type DaemonManager = ConnectionManager<SystemClock, UuidIdGen>;

/// Files the daemon keeps in its state directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub state_dir: PathBuf,
    /// Lock file holding the daemon PID
    pub lock_path: PathBuf,
    pub version_path: PathBuf,
    pub log_path: PathBuf,
    pub snapshot_path: PathBuf,
}

impl Paths {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        let state_dir = state_dir.into();
        Self {
            lock_path: state_dir.join("plotd.pid"),
            version_path: state_dir.join("plotd.version"),
            log_path: state_dir.join("plotd.log"),
            snapshot_path: state_dir.join("snapshot.json"),
            state_dir,
        }
    }

    /// Paths for `config`, resolving the state directory from the environment
    pub fn for_config(config: &Config) -> Result<Self, LifecycleError> {
        let state_dir = config.resolve_state_dir(|var| std::env::var(var).ok())?;
        Ok(Self::new(state_dir))
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("could not determine state directory")]
    NoStateDir,

    #[error("failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("failed to bind {0}: {1}")]
    BindFailed(SocketAddr, std::io::Error),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Daemon state during operation
pub struct DaemonState {
    pub config: Config,
    pub paths: Paths,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    pub service: DaemonService,
    pub manager: Arc<DaemonManager>,
    pub snapshotter: Snapshotter,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl DaemonState {
    /// Address actually bound (resolves port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Start the scheduler, heartbeat sweep and accept loop
    pub fn spawn(&mut self) {
        let shutdown = self.shutdown_tx.subscribe();
        self.tasks.extend(self.service.spawn(shutdown.clone()));
        if let Some(listener) = self.listener.take() {
            self.tasks
                .push(tokio::spawn(Arc::clone(&self.manager).run(listener, shutdown)));
        }
    }

    /// Persist the stores; failures are logged and flip storage availability
    pub fn write_snapshot(&self) -> Result<(), StoreError> {
        self.snapshotter.write(SystemClock.now())
    }

    /// Shutdown the daemon gracefully
    pub async fn shutdown(&mut self) -> Result<(), LifecycleError> {
        info!("shutting down daemon");

        // 1. Stop background loops and tell connections to close
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "background task failed");
            }
        }

        // 2. Final snapshot
        if let Err(e) = self.write_snapshot() {
            warn!(
                error = %e,
                path = %self.snapshotter.path().display(),
                "final snapshot failed"
            );
        }

        // 3. Remove PID and version files; the lock itself is released on drop
        for path in [&self.paths.lock_path, &self.paths.version_path] {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(path) {
                    warn!(path = %path.display(), error = %e, "failed to remove file");
                }
            }
        }

        info!("daemon shutdown complete");
        Ok(())
    }
}

/// Start the daemon
pub async fn startup(config: &Config, paths: &Paths) -> Result<DaemonState, LifecycleError> {
    match startup_inner(config, paths).await {
        Ok(state) => Ok(state),
        Err(e) => {
            // Lock failures mean another daemon owns these files
            if !matches!(e, LifecycleError::LockFailed(_)) {
                cleanup_on_failure(paths);
            }
            Err(e)
        }
    }
}

/// Inner startup logic - cleanup_on_failure called if this fails
async fn startup_inner(config: &Config, paths: &Paths) -> Result<DaemonState, LifecycleError> {
    // 1. Create state directory
    std::fs::create_dir_all(&paths.state_dir)?;

    // 2. Acquire lock file FIRST - prevents races
    let mut lock_file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&paths.lock_path)?;
    lock_file.try_lock_exclusive().map_err(|e| {
        if let Some(pid) = read_pid(&paths.lock_path) {
            warn!(pid, lock = %paths.lock_path.display(), "daemon already running");
        }
        LifecycleError::LockFailed(e)
    })?;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;

    std::fs::write(&paths.version_path, env!("CARGO_PKG_VERSION"))?;

    // 3. Load and reconcile the last snapshot
    let availability = Availability::new();
    let jobs = JobStore::new(availability.clone());
    let devices = DeviceRegistry::new(availability);
    let snapshotter = Snapshotter::new(&paths.snapshot_path, jobs.clone(), devices.clone());
    let reconciled = snapshotter.restore(SystemClock.now())?;
    log_reconciled(&reconciled);

    // 4. Wire the engine
    let deps = EngineDeps::new(
        jobs,
        devices,
        EventBus::new(config.queue_capacity),
        SystemClock,
    );
    let service = Service::new(deps, UuidIdGen, config.engine());
    let manager = Arc::new(ConnectionManager::new(
        service.clone(),
        ServerConfig {
            auth_token: config.auth_token.clone(),
            handshake_timeout: config.handshake_timeout,
            write_timeout: config.write_timeout,
        },
    ));

    // 5. Bind (LAST - only after all validation passes)
    let listener = TcpListener::bind(config.listen)
        .await
        .map_err(|e| LifecycleError::BindFailed(config.listen, e))?;
    let local_addr = listener.local_addr()?;

    info!(
        addr = %local_addr,
        state_dir = %paths.state_dir.display(),
        jobs = service.list_jobs(None).len(),
        devices = service.list_devices().len(),
        "daemon started"
    );

    let (shutdown_tx, _) = watch::channel(false);
    Ok(DaemonState {
        config: config.clone(),
        paths: paths.clone(),
        lock_file,
        listener: Some(listener),
        local_addr,
        service,
        manager,
        snapshotter,
        shutdown_tx,
        tasks: Vec::new(),
    })
}

/// Clean up resources on startup failure
fn cleanup_on_failure(paths: &Paths) {
    for path in [&paths.version_path, &paths.lock_path] {
        if path.exists() {
            let _ = std::fs::remove_file(path);
        }
    }
}

fn log_reconciled(reconciled: &Reconciled) {
    if reconciled.is_empty() {
        return;
    }
    warn!(
        failed = reconciled.failed.len(),
        cancelled = reconciled.cancelled.len(),
        offline = reconciled.offline.len(),
        "reconciled work left active by the previous daemon"
    );
    for job in &reconciled.failed {
        warn!(job_id = %job, "running job marked failed");
    }
    for job in &reconciled.cancelled {
        warn!(job_id = %job, "paused job cancelled");
    }
}

/// Read the PID recorded by a running daemon
fn read_pid(lock_path: &Path) -> Option<u32> {
    std::fs::read_to_string(lock_path).ok()?.trim().parse().ok()
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
