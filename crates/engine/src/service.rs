// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Service facade used by the connection layer and the device link

use crate::heartbeat::{HeartbeatConfig, HeartbeatMonitor};
use crate::scheduler::{Scheduler, SchedulerConfig};
use crate::{EngineDeps, EngineError, JobStateMachine};
use chrono::{DateTime, Utc};
use plot_core::{
    Clock, Device, DeviceId, DeviceInfo, EventBus, IdGen, Job, JobSpec, JobState, Progress,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const USER_REQUEST: &str = "user request";

#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub scheduler: SchedulerConfig,
    pub heartbeat: HeartbeatConfig,
}

/// Client job controls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobAction {
    Pause,
    Resume,
    Cancel,
}

impl JobAction {
    pub fn target(self) -> JobState {
        match self {
            JobAction::Pause => JobState::Paused,
            JobAction::Resume => JobState::Running,
            JobAction::Cancel => JobState::Cancelled,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobAction::Pause => "pause",
            JobAction::Resume => "resume",
            JobAction::Cancel => "cancel",
        }
    }
}

impl fmt::Display for JobAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counts reported by the `status` request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub jobs: Vec<(JobState, usize)>,
    pub devices: usize,
    pub storage_available: bool,
}

#[derive(Clone)]
pub struct Service<C: Clock, I: IdGen> {
    deps: EngineDeps<C>,
    machine: JobStateMachine<C>,
    scheduler: Scheduler<C>,
    monitor: HeartbeatMonitor<C>,
    id_gen: I,
}

impl<C: Clock, I: IdGen> Service<C, I> {
    pub fn new(deps: EngineDeps<C>, id_gen: I, config: EngineConfig) -> Self {
        let machine = JobStateMachine::new(deps.clone());
        let scheduler = Scheduler::new(deps.clone(), machine.clone(), config.scheduler);
        let monitor = HeartbeatMonitor::new(deps.clone(), config.heartbeat);
        Self {
            deps,
            machine,
            scheduler,
            monitor,
            id_gen,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.deps.bus
    }

    pub fn scheduler(&self) -> &Scheduler<C> {
        &self.scheduler
    }

    pub fn monitor(&self) -> &HeartbeatMonitor<C> {
        &self.monitor
    }

    /// Start the scheduler loop and heartbeat sweep
    pub fn spawn(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(self.scheduler.clone().run(shutdown.clone())),
            tokio::spawn(self.monitor.clone().run(shutdown)),
        ]
    }

    // CLI/config collaborator

    pub fn create_job(&self, spec: JobSpec) -> Result<Job, EngineError> {
        self.machine.create(self.id_gen.next_job_id(), spec)
    }

    pub fn request_transition(
        &self,
        job_id: &str,
        target: JobState,
        reason: Option<&str>,
    ) -> Result<Job, EngineError> {
        self.machine
            .transition(job_id, target, reason.unwrap_or(USER_REQUEST))
    }

    pub fn job_control(&self, job_id: &str, action: JobAction) -> Result<Job, EngineError> {
        tracing::info!(job_id, %action, "job control");
        self.machine.transition(job_id, action.target(), USER_REQUEST)
    }

    pub fn list_jobs(&self, state: Option<JobState>) -> Vec<Job> {
        self.deps.jobs.list(state)
    }

    pub fn get_job(&self, job_id: &str) -> Result<Job, EngineError> {
        self.deps
            .jobs
            .get(job_id)
            .ok_or_else(|| EngineError::UnknownJob(job_id.into()))
    }

    pub fn list_devices(&self) -> Vec<Device> {
        self.deps.devices.list()
    }

    pub fn summary(&self) -> Summary {
        Summary {
            jobs: self.deps.jobs.count_by_state(),
            devices: self.deps.devices.len(),
            storage_available: self.deps.jobs.availability().is_available(),
        }
    }

    // Device-link collaborator

    pub fn report_heartbeat(
        &self,
        device_id: &DeviceId,
        timestamp: Option<DateTime<Utc>>,
        info: DeviceInfo,
    ) -> Result<Device, EngineError> {
        self.monitor.heartbeat(device_id, timestamp, info)
    }

    pub fn report_progress(
        &self,
        job_id: &str,
        progress: Progress,
    ) -> Result<Progress, EngineError> {
        self.machine.update_progress(job_id, progress)
    }

    pub fn report_error(&self, device_id: &str, message: &str) -> Result<Device, EngineError> {
        self.monitor.report_error(device_id, message)
    }

    pub fn report_recovered(&self, device_id: &str) -> Result<Device, EngineError> {
        self.monitor.report_recovered(device_id)
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
