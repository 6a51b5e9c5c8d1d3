// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduler: admits Queued jobs onto available devices

use crate::{EngineDeps, EngineError, JobStateMachine};
use plot_core::{admission_order, Clock, DeviceId, JobId, JobState};
use plot_storage::lock;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Longest the loop parks without a wake
    pub tick: Duration,
    /// Jobs holding a device at once, across all devices
    pub max_running_jobs: usize,
    /// Devices silent for longer than this are never handed a job; matches
    /// the heartbeat monitor's threshold
    pub offline_threshold: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(5),
            max_running_jobs: 1,
            offline_threshold: Duration::from_secs(30),
        }
    }
}

/// A job started on a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub job_id: JobId,
    pub device_id: DeviceId,
}

#[derive(Clone)]
pub struct Scheduler<C: Clock> {
    deps: EngineDeps<C>,
    machine: JobStateMachine<C>,
    config: SchedulerConfig,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(deps: EngineDeps<C>, machine: JobStateMachine<C>, config: SchedulerConfig) -> Self {
        Self {
            deps,
            machine,
            config,
        }
    }

    /// One selection pass.
    ///
    /// Queued jobs are taken highest priority first, then earliest queued,
    /// then creation order. Each is paired with the lowest-id available device
    /// until devices or the concurrency limit run out.
    pub fn schedule(&self) -> Result<Vec<Admission>, EngineError> {
        self.deps.jobs.availability().ensure()?;

        let mut queued = self.deps.jobs.list(Some(JobState::Queued));
        queued.sort_by(admission_order);

        let mut holding = self.deps.devices.holding_jobs();
        let mut admitted = Vec::new();
        for job in queued {
            if holding >= self.config.max_running_jobs {
                tracing::debug!(holding, limit = self.config.max_running_jobs, "concurrency limit reached");
                break;
            }
            let Some(device_id) = self.reserve_device(&job.id) else {
                tracing::debug!(job_id = %job.id, "no device available");
                break;
            };

            match self.machine.admit(&job.id, &device_id) {
                Ok(_) => {
                    holding += 1;
                    admitted.push(Admission {
                        job_id: job.id,
                        device_id,
                    });
                }
                Err(e) => {
                    // Usually a concurrent cancel; hand the device back and move on
                    tracing::debug!(job_id = %job.id, device_id = %device_id, error = %e, "admission failed");
                    self.unreserve(&job.id, &device_id);
                }
            }
        }
        Ok(admitted)
    }

    /// Run until `shutdown` flips to true
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            tick = ?self.config.tick,
            max_running_jobs = self.config.max_running_jobs,
            "scheduler started"
        );
        while !*shutdown.borrow() {
            match self.schedule() {
                Ok(admitted) if !admitted.is_empty() => {
                    tracing::debug!(count = admitted.len(), "scheduling pass admitted jobs");
                }
                Ok(_) => {}
                Err(EngineError::Unavailable) => {
                    tracing::warn!("storage unavailable, scheduling paused");
                }
                Err(e) => tracing::error!(error = %e, "scheduling pass failed"),
            }

            tokio::select! {
                _ = self.deps.wakeup.wait() => {}
                _ = tokio::time::sleep(self.config.tick) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::info!("scheduler stopped");
    }

    // A device that went quiet but has not been swept yet is skipped here,
    // so the sweep never demotes a device under a job it just received.
    fn reserve_device(&self, job_id: &JobId) -> Option<DeviceId> {
        let now = self.deps.clock.now();
        let threshold = chrono::Duration::from_std(self.config.offline_threshold)
            .unwrap_or(chrono::Duration::MAX);
        for device_id in self.deps.devices.available(now, threshold) {
            let Ok(entry) = self.deps.devices.entry(device_id.as_str()) else {
                continue;
            };
            let mut device = lock(&entry);
            if device.is_schedulable(now, threshold) && device.reserve(job_id) {
                return Some(device_id);
            }
        }
        None
    }

    fn unreserve(&self, job_id: &JobId, device_id: &DeviceId) {
        if let Ok(entry) = self.deps.devices.entry(device_id.as_str()) {
            lock(&entry).release(job_id);
        }
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
