// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device Registry

use crate::{lock, Availability, StoreError};
use chrono::{DateTime, Duration, Utc};
use plot_core::{Device, DeviceId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

type Table = HashMap<DeviceId, Arc<Mutex<Device>>>;

/// Owns every device; devices appear on first heartbeat and are never removed
#[derive(Clone)]
pub struct DeviceRegistry {
    devices: Arc<RwLock<Table>>,
    availability: Availability,
}

impl DeviceRegistry {
    pub fn new(availability: Availability) -> Self {
        Self {
            devices: Arc::new(RwLock::new(HashMap::new())),
            availability,
        }
    }

    pub fn availability(&self) -> &Availability {
        &self.availability
    }

    /// The lock for a device, creating it Connected at `seen_at` if unknown.
    ///
    /// Returns whether the device was created by this call.
    pub fn get_or_create(
        &self,
        id: &DeviceId,
        seen_at: DateTime<Utc>,
    ) -> Result<(Arc<Mutex<Device>>, bool), StoreError> {
        self.availability.ensure()?;
        if let Some(entry) = self
            .devices
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
        {
            return Ok((Arc::clone(entry), false));
        }

        let mut devices = self.devices.write().unwrap_or_else(|e| e.into_inner());
        // Another heartbeat may have created it between the two locks
        if let Some(entry) = devices.get(id) {
            return Ok((Arc::clone(entry), false));
        }
        let entry = Arc::new(Mutex::new(Device::new(id.clone(), seen_at)));
        devices.insert(id.clone(), Arc::clone(&entry));
        Ok((entry, true))
    }

    pub fn entry(&self, id: &str) -> Result<Arc<Mutex<Device>>, StoreError> {
        self.devices
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::UnknownDevice(DeviceId::new(id)))
    }

    pub fn get(&self, id: &str) -> Option<Device> {
        self.entry(id).ok().map(|entry| lock(&entry).clone())
    }

    /// Consistent copies of all devices, ordered by id
    pub fn list(&self) -> Vec<Device> {
        let mut devices: Vec<Device> = self
            .entries()
            .iter()
            .map(|(_, entry)| lock(entry).clone())
            .collect();
        devices.sort_by(|a, b| a.id.cmp(&b.id));
        devices
    }

    /// Entry handles ordered by id, for sweeps that lock one device at a time
    pub fn entries(&self) -> Vec<(DeviceId, Arc<Mutex<Device>>)> {
        let mut entries: Vec<_> = self
            .devices
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(id, entry)| (id.clone(), Arc::clone(entry)))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Ids of Connected devices with no job and a heartbeat within
    /// `threshold` of `now`, ordered by id
    pub fn available(&self, now: DateTime<Utc>, threshold: Duration) -> Vec<DeviceId> {
        self.entries()
            .into_iter()
            .filter(|(_, entry)| lock(entry).is_schedulable(now, threshold))
            .map(|(id, _)| id)
            .collect()
    }

    /// Number of devices currently holding a job
    pub fn holding_jobs(&self) -> usize {
        self.entries()
            .iter()
            .filter(|(_, entry)| lock(entry).current_job_id.is_some())
            .count()
    }

    pub fn len(&self) -> usize {
        self.devices.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the contents with devices loaded from a snapshot
    pub fn restore(&self, loaded: Vec<Device>) {
        let table: Table = loaded
            .into_iter()
            .map(|device| (device.id.clone(), Arc::new(Mutex::new(device))))
            .collect();
        *self.devices.write().unwrap_or_else(|e| e.into_inner()) = table;
    }
}

#[cfg(test)]
#[path = "devices_tests.rs"]
mod tests;
