// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Events published on every job and device mutation

use crate::device::DeviceStatus;
use crate::id::{DeviceId, JobId};
use crate::job::{JobState, Progress};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Event categories as named on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    JobStateChange,
    JobProgress,
    DeviceStatus,
    SystemAlert,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::JobStateChange => "job_state_change",
            EventType::JobProgress => "job_progress",
            EventType::DeviceStatus => "device_status",
            EventType::SystemAlert => "system_alert",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

/// What happened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// `from` is None for the creation event
    JobStateChange {
        job_id: JobId,
        from: Option<JobState>,
        to: JobState,
        reason: String,
        device_id: Option<DeviceId>,
    },
    JobProgress {
        job_id: JobId,
        progress: Progress,
    },
    DeviceStatus {
        device_id: DeviceId,
        status: DeviceStatus,
        current_job_id: Option<JobId>,
        error_count: u64,
        last_heartbeat: DateTime<Utc>,
    },
    SystemAlert {
        severity: Severity,
        title: String,
        message: String,
        source: Option<DeviceId>,
    },
}

/// An immutable, timestamped event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(timestamp: DateTime<Utc>, payload: EventPayload) -> Self {
        Self { timestamp, payload }
    }

    pub fn event_type(&self) -> EventType {
        match self.payload {
            EventPayload::JobStateChange { .. } => EventType::JobStateChange,
            EventPayload::JobProgress { .. } => EventType::JobProgress,
            EventPayload::DeviceStatus { .. } => EventType::DeviceStatus,
            EventPayload::SystemAlert { .. } => EventType::SystemAlert,
        }
    }

    /// The job this event concerns, if any
    pub fn job_id(&self) -> Option<&JobId> {
        match &self.payload {
            EventPayload::JobStateChange { job_id, .. }
            | EventPayload::JobProgress { job_id, .. } => Some(job_id),
            _ => None,
        }
    }

    /// The device this event concerns, if any
    pub fn device_id(&self) -> Option<&DeviceId> {
        match &self.payload {
            EventPayload::DeviceStatus { device_id, .. } => Some(device_id),
            EventPayload::SystemAlert { source, .. } => source.as_ref(),
            EventPayload::JobStateChange { device_id, .. } => device_id.as_ref(),
            EventPayload::JobProgress { .. } => None,
        }
    }

    pub fn alert(
        timestamp: DateTime<Utc>,
        severity: Severity,
        title: impl Into<String>,
        message: impl Into<String>,
        source: Option<DeviceId>,
    ) -> Self {
        Self::new(
            timestamp,
            EventPayload::SystemAlert {
                severity,
                title: title.into(),
                message: message.into(),
                source,
            },
        )
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
