// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON snapshot persistence for the stores

use crate::{DeviceRegistry, JobStore, StoreError};
use chrono::{DateTime, Utc};
use plot_core::{Device, DeviceId, DeviceStatus, Job, JobId, JobState};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub const SNAPSHOT_VERSION: u32 = 1;

const RESTART_REASON: &str = "daemon restarted";

/// Everything the stores hold at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub jobs: Vec<Job>,
    pub devices: Vec<Device>,
}

/// Changes made to loaded state before it is served again
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciled {
    pub failed: Vec<JobId>,
    pub cancelled: Vec<JobId>,
    pub offline: Vec<DeviceId>,
}

impl Reconciled {
    pub fn is_empty(&self) -> bool {
        self.failed.is_empty() && self.cancelled.is_empty() && self.offline.is_empty()
    }
}

impl Snapshot {
    /// Copy the stores. Each entity is copied under its own lock.
    pub fn capture(jobs: &JobStore, devices: &DeviceRegistry, now: DateTime<Utc>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: now,
            jobs: jobs.list(None),
            devices: devices.list(),
        }
    }

    /// Read a snapshot; a missing file is not an error
    pub fn load(path: &Path) -> Result<Option<Self>, StoreError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(StoreError::Version(snapshot.version));
        }
        Ok(Some(snapshot))
    }

    /// Write to a temp file next to `path`, sync it, then rename over `path`
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = File::create(&tmp)?;
            serde_json::to_writer_pretty(&mut file, self)?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Settle state left behind by a previous process.
    ///
    /// No device link survives a restart, so every device starts Offline and
    /// jobs that held one are ended: Running jobs fail, Paused jobs are
    /// cancelled. Queued and Created jobs are kept.
    pub fn reconcile(&mut self, now: DateTime<Utc>) -> Reconciled {
        let mut reconciled = Reconciled::default();

        for job in &mut self.jobs {
            let target = match job.state {
                JobState::Running => JobState::Failed,
                JobState::Paused => JobState::Cancelled,
                _ => continue,
            };
            if job.transition(target, RESTART_REASON, now).is_ok() {
                match target {
                    JobState::Failed => reconciled.failed.push(job.id.clone()),
                    _ => reconciled.cancelled.push(job.id.clone()),
                }
            }
        }

        for device in &mut self.devices {
            if device.status != DeviceStatus::Offline {
                device.go_offline();
                reconciled.offline.push(device.id.clone());
            }
            device.current_job_id = None;
        }

        reconciled
    }
}

/// Writes the stores to one snapshot file and tracks store availability
#[derive(Clone)]
pub struct Snapshotter {
    path: PathBuf,
    jobs: JobStore,
    devices: DeviceRegistry,
}

impl Snapshotter {
    pub fn new(path: impl Into<PathBuf>, jobs: JobStore, devices: DeviceRegistry) -> Self {
        Self {
            path: path.into(),
            jobs,
            devices,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and reconcile the snapshot, then replace the store contents
    pub fn restore(&self, now: DateTime<Utc>) -> Result<Reconciled, StoreError> {
        let Some(mut snapshot) = Snapshot::load(&self.path)? else {
            tracing::info!(path = %self.path.display(), "no snapshot, starting empty");
            return Ok(Reconciled::default());
        };

        let reconciled = snapshot.reconcile(now);
        tracing::info!(
            jobs = snapshot.jobs.len(),
            devices = snapshot.devices.len(),
            failed = reconciled.failed.len(),
            cancelled = reconciled.cancelled.len(),
            "restored snapshot"
        );
        self.jobs.restore(snapshot.jobs);
        self.devices.restore(snapshot.devices);
        Ok(reconciled)
    }

    /// Persist the current state.
    ///
    /// A failure marks the stores unavailable; the next successful write marks
    /// them available again.
    pub fn write(&self, now: DateTime<Utc>) -> Result<(), StoreError> {
        let snapshot = Snapshot::capture(&self.jobs, &self.devices, now);
        let availability = self.jobs.availability();
        match snapshot.save(&self.path) {
            Ok(()) => {
                if availability.mark_available() {
                    tracing::warn!(path = %self.path.display(), "storage recovered");
                }
                tracing::debug!(jobs = snapshot.jobs.len(), "snapshot written");
                Ok(())
            }
            Err(e) => {
                if availability.mark_unavailable() {
                    tracing::error!(path = %self.path.display(), error = %e, "snapshot write failed, storage unavailable");
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
