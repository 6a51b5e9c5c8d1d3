// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Heartbeat Monitor: device liveness and fault reports
//!
//! Heartbeats create and revive devices. A periodic sweep demotes devices
//! whose last heartbeat is older than the offline threshold; a demoted
//! device's Running job fails with "device offline". Error reports only count
//! faults and block scheduling; they never fail a job.

use crate::{EngineDeps, EngineError};
use chrono::{DateTime, Utc};
use plot_core::{Clock, Device, DeviceId, DeviceInfo, Job, JobId, JobState, Severity};
use plot_storage::lock;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

pub const DEVICE_OFFLINE: &str = "device offline";

const DEMOTE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    pub offline_threshold: Duration,
    pub sweep_interval: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            offline_threshold: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(5),
        }
    }
}

/// A device demoted by a sweep and what happened to its job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Demotion {
    pub device_id: DeviceId,
    pub job: Option<(JobId, JobState)>,
}

#[derive(Clone)]
pub struct HeartbeatMonitor<C: Clock> {
    deps: EngineDeps<C>,
    config: HeartbeatConfig,
}

impl<C: Clock> HeartbeatMonitor<C> {
    pub fn new(deps: EngineDeps<C>, config: HeartbeatConfig) -> Self {
        Self { deps, config }
    }

    fn threshold(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.config.offline_threshold).unwrap_or(chrono::Duration::MAX)
    }

    /// Record a heartbeat, creating the device on first sight.
    ///
    /// Timestamps ahead of the local clock are clamped to it, so a skewed
    /// device cannot keep itself alive past the threshold. A heartbeat that
    /// was already older than the threshold on arrival only advances
    /// `last_heartbeat`; it never revives an Offline device or wakes the
    /// scheduler.
    pub fn heartbeat(
        &self,
        device_id: &DeviceId,
        timestamp: Option<DateTime<Utc>>,
        info: DeviceInfo,
    ) -> Result<Device, EngineError> {
        let now = self.deps.clock.now();
        let seen_at = timestamp.map_or(now, |ts| ts.min(now));
        let late = now - seen_at > self.threshold();

        let (entry, created) = self.deps.devices.get_or_create(device_id, seen_at)?;
        let mut device = lock(&entry);
        device.update_info(info);

        let revived = if late {
            device.touch(seen_at);
            tracing::debug!(
                device_id = %device.id,
                age_secs = (now - seen_at).num_seconds(),
                "late heartbeat"
            );
            false
        } else {
            device.heartbeat(seen_at)
        };

        if created || revived {
            self.deps.publish_device(&device);
            tracing::info!(device_id = %device.id, created, "device connected");
        } else {
            tracing::trace!(device_id = %device.id, "heartbeat");
        }
        if revived || (created && !late) {
            self.deps.wakeup.wake();
        }
        Ok(device.clone())
    }

    /// Count a device fault
    pub fn report_error(&self, device_id: &str, message: &str) -> Result<Device, EngineError> {
        let entry = self.deps.devices.entry(device_id)?;
        let mut device = lock(&entry);
        self.deps.devices.availability().ensure()?;

        device.record_error(message);
        self.deps.publish_device(&device);
        tracing::warn!(
            device_id = %device.id,
            status = %device.status,
            error_count = device.error_count,
            message,
            "device error"
        );
        self.deps.alert(
            Severity::Error,
            "Device error",
            message.to_string(),
            Some(device.id.clone()),
        );
        Ok(device.clone())
    }

    /// Clear a device's Error status
    pub fn report_recovered(&self, device_id: &str) -> Result<Device, EngineError> {
        let entry = self.deps.devices.entry(device_id)?;
        let mut device = lock(&entry);
        self.deps.devices.availability().ensure()?;

        if device.recover() {
            self.deps.publish_device(&device);
            tracing::info!(device_id = %device.id, "device recovered");
            self.deps.wakeup.wake();
        }
        Ok(device.clone())
    }

    /// Demote every device whose heartbeat is overdue
    pub fn sweep(&self) -> Result<Vec<Demotion>, EngineError> {
        self.deps.devices.availability().ensure()?;

        let now = self.deps.clock.now();
        let threshold = self.threshold();
        let mut demoted = Vec::new();

        for (device_id, entry) in self.deps.devices.entries() {
            let held = {
                let device = lock(&entry);
                if !device.is_stale(now, threshold) {
                    continue;
                }
                device.current_job_id.clone()
            };
            if let Some(demotion) = self.demote(&device_id, &entry, held, now, threshold) {
                demoted.push(demotion);
            }
        }

        if !demoted.is_empty() {
            self.deps.wakeup.wake();
        }
        Ok(demoted)
    }

    // Takes the job lock (if any) before the device lock, then re-checks
    // staleness and the holder: a heartbeat or an admission may have landed
    // since the first look. A changed holder is retried with both locks
    // dropped; if it keeps changing the device is left for the next sweep.
    fn demote(
        &self,
        device_id: &DeviceId,
        entry: &Arc<Mutex<Device>>,
        mut held: Option<JobId>,
        now: DateTime<Utc>,
        threshold: chrono::Duration,
    ) -> Option<Demotion> {
        for _ in 0..DEMOTE_ATTEMPTS {
            let job_entry = held
                .as_ref()
                .and_then(|id| self.deps.jobs.entry(id.as_str()).ok());
            let mut job = job_entry.as_ref().map(|e| lock(e));
            let mut device = lock(entry);
            if !device.is_stale(now, threshold) {
                return None;
            }
            if device.current_job_id != held {
                held = device.current_job_id.clone();
                continue;
            }
            return Some(self.demote_locked(device_id, &mut device, job.as_deref_mut(), now));
        }
        tracing::debug!(device_id = %device_id, "device holder kept changing, demotion deferred");
        None
    }

    // Both locks held; `job` is the job the device holds, if any
    fn demote_locked(
        &self,
        device_id: &DeviceId,
        device: &mut Device,
        job: Option<&mut Job>,
        now: DateTime<Utc>,
    ) -> Demotion {
        let silent_for = now - device.last_heartbeat;
        let lost = device.go_offline();
        self.deps.publish_device(device);
        tracing::warn!(device_id = %device_id, silent_secs = silent_for.num_seconds(), "device offline");

        let mut outcome = None;
        if let Some(job) = job.filter(|job| lost.as_ref() == Some(&job.id)) {
            // A Paused job cannot fail; it is cancelled instead
            let target = match job.state {
                JobState::Running => Some(JobState::Failed),
                JobState::Paused => Some(JobState::Cancelled),
                _ => None,
            };
            if let Some(target) = target {
                let from = job.state;
                if job.transition(target, DEVICE_OFFLINE, now).is_ok() {
                    self.deps.publish_job_change(job, Some(from), DEVICE_OFFLINE);
                    tracing::warn!(job_id = %job.id, device_id = %device_id, to = %target, "job ended by device loss");
                    outcome = Some((job.id.clone(), target));
                }
            }
        }

        let message = match &outcome {
            Some((job_id, state)) => format!(
                "{device_id} sent no heartbeat for {}s; job {job_id} {state}",
                silent_for.num_seconds()
            ),
            None => format!(
                "{device_id} sent no heartbeat for {}s",
                silent_for.num_seconds()
            ),
        };
        self.deps
            .alert(Severity::Warning, "Device offline", message, Some(device_id.clone()));

        Demotion {
            device_id: device_id.clone(),
            job: outcome,
        }
    }

    /// Sweep on every interval until `shutdown` flips to true
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            threshold = ?self.config.offline_threshold,
            interval = ?self.config.sweep_interval,
            "heartbeat monitor started"
        );
        let mut interval = tokio::time::interval(self.config.sweep_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        while !*shutdown.borrow() {
            tokio::select! {
                _ = interval.tick() => {
                    match self.sweep() {
                        Ok(_) => {}
                        Err(EngineError::Unavailable) => {
                            tracing::warn!("storage unavailable, heartbeat sweep skipped");
                        }
                        Err(e) => tracing::error!(error = %e, "heartbeat sweep failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::info!("heartbeat monitor stopped");
    }
}

#[cfg(test)]
#[path = "heartbeat_tests.rs"]
mod tests;
