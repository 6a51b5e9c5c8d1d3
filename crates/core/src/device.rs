// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device model
//!
//! A device runs at most one job. `current_job_id` is set exactly when the
//! status is Busy: reserving moves Connected → Busy, releasing moves it back.

use crate::id::{DeviceId, JobId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection status of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    /// Heartbeating and idle
    Connected,
    /// Holding a job
    Busy,
    /// Reported a fault while idle; not schedulable until recovered
    Error,
    /// No heartbeat within the offline threshold
    Offline,
}

impl DeviceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceStatus::Connected => "connected",
            DeviceStatus::Busy => "busy",
            DeviceStatus::Error => "error",
            DeviceStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional details a device link may attach to heartbeats
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub firmware_version: Option<String>,
}

/// A plotting device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub status: DeviceStatus,
    pub current_job_id: Option<JobId>,
    pub last_heartbeat: DateTime<Utc>,
    pub error_count: u64,
    pub last_error: Option<String>,
    /// Start of the current connected period; cleared while Offline
    pub connected_since: Option<DateTime<Utc>>,
    pub info: DeviceInfo,
}

impl Device {
    /// A device seen for the first time; it is Connected from `seen_at`
    pub fn new(id: DeviceId, seen_at: DateTime<Utc>) -> Self {
        Self {
            id,
            status: DeviceStatus::Connected,
            current_job_id: None,
            last_heartbeat: seen_at,
            error_count: 0,
            last_error: None,
            connected_since: Some(seen_at),
            info: DeviceInfo::default(),
        }
    }

    /// Connected and idle
    pub fn is_available(&self) -> bool {
        self.status == DeviceStatus::Connected && self.current_job_id.is_none()
    }

    /// Available and heard from within `threshold`, so safe to hand a job
    pub fn is_schedulable(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        self.is_available() && !self.is_stale(now, threshold)
    }

    /// Time since the device last came online, zero while Offline
    pub fn uptime(&self, now: DateTime<Utc>) -> Duration {
        self.connected_since
            .map(|since| (now - since).max(Duration::zero()))
            .unwrap_or_else(Duration::zero)
    }

    /// Whether the last heartbeat is older than `threshold`
    pub fn is_stale(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        self.status != DeviceStatus::Offline && now - self.last_heartbeat > threshold
    }

    /// Record a heartbeat. Returns true when the status changed (Offline → Connected).
    ///
    /// Heartbeats delivered out of order never move `last_heartbeat` backwards.
    pub fn heartbeat(&mut self, timestamp: DateTime<Utc>) -> bool {
        self.touch(timestamp);
        if self.status == DeviceStatus::Offline {
            self.status = DeviceStatus::Connected;
            self.connected_since = Some(timestamp);
            return true;
        }
        false
    }

    /// Record a heartbeat without changing status
    pub fn touch(&mut self, timestamp: DateTime<Utc>) {
        self.last_heartbeat = self.last_heartbeat.max(timestamp);
    }

    /// Merge details reported alongside a heartbeat
    pub fn update_info(&mut self, info: DeviceInfo) {
        if info.device_type.is_some() {
            self.info.device_type = info.device_type;
        }
        if info.firmware_version.is_some() {
            self.info.firmware_version = info.firmware_version;
        }
    }

    /// Claim an idle device for `job_id`. Returns false if it is not available.
    pub fn reserve(&mut self, job_id: &JobId) -> bool {
        if !self.is_available() {
            return false;
        }
        self.status = DeviceStatus::Busy;
        self.current_job_id = Some(job_id.clone());
        true
    }

    /// Whether this device currently holds `job_id`
    pub fn holds(&self, job_id: &JobId) -> bool {
        self.current_job_id.as_ref() == Some(job_id)
    }

    /// Give up the reservation held for `job_id`. Returns false if it held another job.
    pub fn release(&mut self, job_id: &JobId) -> bool {
        if !self.holds(job_id) {
            return false;
        }
        self.current_job_id = None;
        if self.status == DeviceStatus::Busy {
            self.status = DeviceStatus::Connected;
        }
        true
    }

    /// Count a device fault. Returns true when the status changed.
    ///
    /// An idle device moves to Error. A busy device keeps its job; faults
    /// never fail a job on their own.
    pub fn record_error(&mut self, message: &str) -> bool {
        self.error_count += 1;
        self.last_error = Some(message.to_string());
        if self.status == DeviceStatus::Connected {
            self.status = DeviceStatus::Error;
            return true;
        }
        false
    }

    /// Clear an Error status. Returns true when the status changed.
    pub fn recover(&mut self) -> bool {
        if self.status == DeviceStatus::Error {
            self.status = DeviceStatus::Connected;
            return true;
        }
        false
    }

    /// Demote to Offline, handing back the job it was holding
    pub fn go_offline(&mut self) -> Option<JobId> {
        self.status = DeviceStatus::Offline;
        self.connected_since = None;
        self.current_job_id.take()
    }
}

#[cfg(test)]
#[path = "device_tests.rs"]
mod tests;
