// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deterministic engine fixture shared by the unit tests

use crate::{EngineConfig, EngineDeps, JobStateMachine, Service};
use plot_core::{
    Channel, Clock, Device, DeviceId, DeviceInfo, Event, EventBus, EventPayload, EventStream,
    FakeClock, Job, JobId, JobSpec, JobState, SequentialIdGen,
};
use plot_storage::{Availability, DeviceRegistry, JobStore};
use std::sync::Arc;
use std::time::Duration;

pub struct Harness {
    pub clock: FakeClock,
    pub deps: EngineDeps<FakeClock>,
    pub machine: JobStateMachine<FakeClock>,
    pub service: Service<FakeClock, SequentialIdGen>,
    pub events: EventStream,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let availability = Availability::new();
        let clock = FakeClock::new();
        let bus = EventBus::new(1024);
        let deps = EngineDeps::new(
            JobStore::new(availability.clone()),
            DeviceRegistry::new(availability),
            bus.clone(),
            clock.clone(),
        );
        let events = bus.register();
        bus.subscribe(events.id(), [Channel::All]).unwrap();

        Self {
            clock,
            machine: JobStateMachine::new(deps.clone()),
            service: Service::new(deps.clone(), SequentialIdGen::default(), config),
            deps,
            events,
        }
    }

    pub fn advance(&self, secs: u64) {
        self.clock.advance(Duration::from_secs(secs));
    }

    /// Everything published since the last drain
    pub fn drain(&mut self) -> Vec<Arc<Event>> {
        let mut out = Vec::new();
        while let Ok(Some(event)) = self.events.try_recv() {
            out.push(event);
        }
        out
    }

    /// `(job, from, to)` for each state change published since the last drain
    pub fn drain_changes(&mut self) -> Vec<(JobId, Option<JobState>, JobState)> {
        self.drain()
            .iter()
            .filter_map(|event| match &event.payload {
                EventPayload::JobStateChange { job_id, from, to, .. } => {
                    Some((job_id.clone(), *from, *to))
                }
                _ => None,
            })
            .collect()
    }

    pub fn create(&self, name: &str, priority: i32) -> JobId {
        self.service
            .create_job(JobSpec::new(name, priority))
            .unwrap()
            .id
    }

    pub fn queue(&self, name: &str, priority: i32) -> JobId {
        let id = self.create(name, priority);
        self.service
            .request_transition(id.as_str(), JobState::Queued, None)
            .unwrap();
        id
    }

    /// Heartbeat `device` at the current time
    pub fn connect(&self, device: &str) -> DeviceId {
        let id = DeviceId::new(device);
        self.service
            .report_heartbeat(&id, Some(self.clock.now()), DeviceInfo::default())
            .unwrap();
        id
    }

    /// Queue a job, connect a device, and admit the job onto it
    pub fn running(&mut self, name: &str, device: &str) -> (JobId, DeviceId) {
        let job = self.queue(name, 1);
        let device = self.connect(device);
        self.service.scheduler().schedule().unwrap();
        assert_eq!(self.job(&job).state, JobState::Running);
        self.drain();
        (job, device)
    }

    pub fn job(&self, id: &JobId) -> Job {
        self.deps.jobs.get(id.as_str()).unwrap()
    }

    pub fn device(&self, id: &DeviceId) -> Device {
        self.deps.devices.get(id.as_str()).unwrap()
    }

    pub fn availability(&self) -> &Availability {
        self.deps.jobs.availability()
    }
}
