// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared handles passed to every engine component

use plot_core::{
    Clock, Device, DeviceId, Event, EventBus, EventPayload, Job, JobState, Severity,
};
use plot_storage::{DeviceRegistry, JobStore};
use std::sync::Arc;
use tokio::sync::Notify;

/// Wakes the scheduler loop.
///
/// A wake with no waiter is remembered, so a wake that races the loop going
/// to sleep is never lost.
#[derive(Clone, Default)]
pub struct Wakeup(Arc<Notify>);

impl Wakeup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wake(&self) {
        self.0.notify_one();
    }

    pub async fn wait(&self) {
        self.0.notified().await;
    }
}

/// Process-scoped stores, bus and clock
#[derive(Clone)]
pub struct EngineDeps<C: Clock> {
    pub jobs: JobStore,
    pub devices: DeviceRegistry,
    pub bus: EventBus,
    pub clock: C,
    pub wakeup: Wakeup,
}

impl<C: Clock> EngineDeps<C> {
    pub fn new(jobs: JobStore, devices: DeviceRegistry, bus: EventBus, clock: C) -> Self {
        Self {
            jobs,
            devices,
            bus,
            clock,
            wakeup: Wakeup::new(),
        }
    }

    // The publish helpers below are called with the entity lock still held,
    // so per-entity event order matches mutation order.

    pub(crate) fn publish_job_change(&self, job: &Job, from: Option<JobState>, reason: &str) {
        self.bus.publish(Event::new(
            self.clock.now(),
            EventPayload::JobStateChange {
                job_id: job.id.clone(),
                from,
                to: job.state,
                reason: reason.to_string(),
                device_id: job.device_id.clone(),
            },
        ));
    }

    pub(crate) fn publish_device(&self, device: &Device) {
        self.bus.publish(Event::new(
            self.clock.now(),
            EventPayload::DeviceStatus {
                device_id: device.id.clone(),
                status: device.status,
                current_job_id: device.current_job_id.clone(),
                error_count: device.error_count,
                last_heartbeat: device.last_heartbeat,
            },
        ));
    }

    pub(crate) fn alert(
        &self,
        severity: Severity,
        title: &str,
        message: String,
        source: Option<DeviceId>,
    ) {
        self.bus
            .publish(Event::alert(self.clock.now(), severity, title, message, source));
    }
}
