// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job State Machine: the only writer of `Job.state`
//!
//! Every mutation is read-check-write under the job's lock, and the resulting
//! event is published before the lock is released. When a device is touched
//! as well, the job lock is taken first and the device lock second.

use crate::{EngineDeps, EngineError};
use plot_core::{
    Clock, DeviceId, DeviceStatus, Event, EventPayload, InvalidTransition, Job, JobId, JobSpec,
    JobState, Progress,
};
use plot_storage::lock;

const SCHEDULED: &str = "scheduled";

#[derive(Clone)]
pub struct JobStateMachine<C: Clock> {
    deps: EngineDeps<C>,
}

impl<C: Clock> JobStateMachine<C> {
    pub fn new(deps: EngineDeps<C>) -> Self {
        Self { deps }
    }

    /// Add a job in Created and publish its creation
    pub fn create(&self, id: JobId, spec: JobSpec) -> Result<Job, EngineError> {
        if spec.name.trim().is_empty() {
            return Err(EngineError::InvalidRequest("job name is empty".to_string()));
        }

        let now = self.deps.clock.now();
        let job = Job::new(id, spec, self.deps.jobs.next_sequence(), now);
        let entry = self.deps.jobs.insert(job)?;
        let job = lock(&entry);
        self.deps.publish_job_change(&job, None, "created");
        tracing::info!(job_id = %job.id, name = %job.name, priority = job.priority, "job created");
        Ok(job.clone())
    }

    /// Move a job to `target`.
    ///
    /// Queued → Running is refused here; only scheduler admission may start a
    /// job. Reaching a terminal state frees the job's device.
    pub fn transition(
        &self,
        job_id: &str,
        target: JobState,
        reason: &str,
    ) -> Result<Job, EngineError> {
        let entry = self.deps.jobs.entry(job_id)?;
        let mut job = lock(&entry);

        let from = job.state;
        let admission_only = from == JobState::Queued && target == JobState::Running;
        if admission_only || !from.can_transition_to(target) {
            tracing::debug!(job_id = %job.id, %from, to = %target, "rejected transition");
            return Err(InvalidTransition { from, to: target }.into());
        }
        self.deps.jobs.availability().ensure()?;

        job.transition(target, reason, self.deps.clock.now())?;
        self.deps.publish_job_change(&job, Some(from), reason);
        tracing::info!(job_id = %job.id, %from, to = %target, reason, "job transition");

        if target.is_terminal() {
            if let Some(device_id) = job.device_id.clone() {
                self.release_device(&job.id, &device_id);
            }
        }
        if target == JobState::Queued || target.is_terminal() {
            self.deps.wakeup.wake();
        }
        Ok(job.clone())
    }

    /// Start a Queued job on a device the scheduler has already reserved for it
    pub(crate) fn admit(&self, job_id: &JobId, device_id: &DeviceId) -> Result<Job, EngineError> {
        let entry = self.deps.jobs.entry(job_id.as_str())?;
        let mut job = lock(&entry);
        if job.state != JobState::Queued {
            return Err(InvalidTransition {
                from: job.state,
                to: JobState::Running,
            }
            .into());
        }
        self.deps.jobs.availability().ensure()?;

        let device_entry = self.deps.devices.entry(device_id.as_str())?;
        let device = lock(&device_entry);
        if device.status != DeviceStatus::Busy || !device.holds(&job.id) {
            return Err(EngineError::DeviceUnavailable(device_id.clone()));
        }

        let previous_device = job.device_id.replace(device_id.clone());
        if let Err(e) = job.transition(JobState::Running, SCHEDULED, self.deps.clock.now()) {
            job.device_id = previous_device;
            return Err(e.into());
        }
        self.deps.publish_job_change(&job, Some(JobState::Queued), SCHEDULED);
        self.deps.publish_device(&device);
        tracing::info!(job_id = %job.id, device_id = %device_id, "job admitted");
        Ok(job.clone())
    }

    /// Record progress for a Running job
    pub fn update_progress(
        &self,
        job_id: &str,
        progress: Progress,
    ) -> Result<Progress, EngineError> {
        let entry = self.deps.jobs.entry(job_id)?;
        let mut job = lock(&entry);
        self.deps.jobs.availability().ensure()?;

        if let Err(e) = job.record_progress(progress) {
            tracing::debug!(job_id = %job.id, error = %e, "progress rejected");
            return Err(e.into());
        }
        let recorded = job.progress.clone();
        self.deps.bus.publish(Event::new(
            self.deps.clock.now(),
            EventPayload::JobProgress {
                job_id: job.id.clone(),
                progress: recorded.clone(),
            },
        ));
        Ok(recorded)
    }

    // Called with the job lock held
    fn release_device(&self, job_id: &JobId, device_id: &DeviceId) {
        let entry = match self.deps.devices.entry(device_id.as_str()) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(
                    job_id = %job_id,
                    device_id = %device_id,
                    error = %e,
                    "device missing on release"
                );
                return;
            }
        };
        let mut device = lock(&entry);
        if device.release(job_id) {
            self.deps.publish_device(&device);
            tracing::debug!(job_id = %job_id, device_id = %device_id, "device released");
        }
    }
}

#[cfg(test)]
#[path = "machine_tests.rs"]
mod tests;
