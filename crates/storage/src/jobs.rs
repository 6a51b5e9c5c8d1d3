// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job Store

use crate::{lock, Availability, StoreError};
use plot_core::{Job, JobId, JobState};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

type Table = HashMap<JobId, Arc<Mutex<Job>>>;

/// Owns every job for the life of the process
#[derive(Clone)]
pub struct JobStore {
    jobs: Arc<RwLock<Table>>,
    next_sequence: Arc<AtomicU64>,
    availability: Availability,
}

impl JobStore {
    pub fn new(availability: Availability) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            next_sequence: Arc::new(AtomicU64::new(1)),
            availability,
        }
    }

    pub fn availability(&self) -> &Availability {
        &self.availability
    }

    /// Creation order counter for the next job
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Add a new job
    pub fn insert(&self, job: Job) -> Result<Arc<Mutex<Job>>, StoreError> {
        self.availability.ensure()?;
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        if jobs.contains_key(&job.id) {
            return Err(StoreError::DuplicateJob(job.id));
        }
        let id = job.id.clone();
        let entry = Arc::new(Mutex::new(job));
        jobs.insert(id, Arc::clone(&entry));
        Ok(entry)
    }

    /// The lock for one job, by exact id or unique prefix
    pub fn entry(&self, id: &str) -> Result<Arc<Mutex<Job>>, StoreError> {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = jobs.get(id) {
            return Ok(Arc::clone(entry));
        }

        let mut matches = jobs.iter().filter(|(k, _)| k.as_str().starts_with(id));
        match (matches.next(), matches.next()) {
            (Some((_, entry)), None) if !id.is_empty() => Ok(Arc::clone(entry)),
            _ => Err(StoreError::UnknownJob(JobId::new(id))),
        }
    }

    /// Copy of one job
    pub fn get(&self, id: &str) -> Option<Job> {
        self.entry(id).ok().map(|entry| lock(&entry).clone())
    }

    /// Consistent copies of all jobs, optionally filtered by state, in creation order
    pub fn list(&self, state: Option<JobState>) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .entries()
            .iter()
            .map(|entry| lock(entry).clone())
            .filter(|job| state.map_or(true, |s| job.state == s))
            .collect();
        jobs.sort_by_key(|job| job.sequence);
        jobs
    }

    /// Number of jobs in each state, in lifecycle order
    pub fn count_by_state(&self) -> Vec<(JobState, usize)> {
        let jobs = self.list(None);
        JobState::ALL
            .into_iter()
            .map(|state| (state, jobs.iter().filter(|job| job.state == state).count()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the contents with jobs loaded from a snapshot
    pub fn restore(&self, loaded: Vec<Job>) {
        let next = loaded.iter().map(|job| job.sequence).max().unwrap_or(0) + 1;
        let table: Table = loaded
            .into_iter()
            .map(|job| (job.id.clone(), Arc::new(Mutex::new(job))))
            .collect();
        *self.jobs.write().unwrap_or_else(|e| e.into_inner()) = table;
        self.next_sequence.store(next, Ordering::Relaxed);
    }

    // Collect the entry handles first so no job lock is taken under the map lock
    fn entries(&self) -> Vec<Arc<Mutex<Job>>> {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
#[path = "jobs_tests.rs"]
mod tests;
