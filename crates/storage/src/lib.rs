// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! plot-storage: Job Store, Device Registry and snapshot persistence
//!
//! Both stores are lock tables: a map from id to `Arc<Mutex<T>>`. The map lock
//! is only held long enough to find or insert an entry, so unrelated entities
//! are mutated concurrently and each entity has exactly one writer at a time.

mod devices;
mod error;
mod jobs;
mod snapshot;

pub use devices::DeviceRegistry;
pub use error::StoreError;
pub use jobs::JobStore;
pub use snapshot::{Reconciled, Snapshot, Snapshotter, SNAPSHOT_VERSION};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Lock an entity, recovering from a poisoned mutex
pub fn lock<T>(entry: &Mutex<T>) -> MutexGuard<'_, T> {
    entry.lock().unwrap_or_else(|e| e.into_inner())
}

/// Shared flag recording whether the backing store is writable
///
/// When persistence fails every mutation is refused with
/// [`StoreError::Unavailable`]; reads keep working from memory.
#[derive(Debug, Clone)]
pub struct Availability(Arc<AtomicBool>);

impl Availability {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_available(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn ensure(&self) -> Result<(), StoreError> {
        if self.is_available() {
            Ok(())
        } else {
            Err(StoreError::Unavailable)
        }
    }

    /// Returns true when this call changed the flag
    pub fn mark_unavailable(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }

    /// Returns true when this call changed the flag
    pub fn mark_available(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }
}

impl Default for Availability {
    fn default() -> Self {
        Self::new()
    }
}
