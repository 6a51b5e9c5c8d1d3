// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the engine

use plot_core::{DeviceId, InvalidTransition, JobId, ProgressError};
use plot_storage::StoreError;
use thiserror::Error;

/// Errors returned by engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    #[error("unknown job: {0}")]
    UnknownJob(JobId),
    #[error("unknown device: {0}")]
    UnknownDevice(DeviceId),
    #[error("stale progress: {reported} points reported, {recorded} already recorded")]
    StaleProgress { recorded: u64, reported: u64 },
    #[error(transparent)]
    Progress(ProgressError),
    #[error("device {0} is not reserved for this job")]
    DeviceUnavailable(DeviceId),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("storage unavailable")]
    Unavailable,
    #[error("storage error: {0}")]
    Storage(StoreError),
}

impl EngineError {
    /// Stable name for the error class, sent to clients
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::InvalidTransition(_) => "invalid_transition",
            EngineError::UnknownJob(_) | EngineError::UnknownDevice(_) => "unknown_entity",
            EngineError::StaleProgress { .. } => "stale_progress",
            EngineError::Progress(_) => "invalid_progress",
            EngineError::DeviceUnavailable(_) => "device_unavailable",
            EngineError::InvalidRequest(_) => "invalid_request",
            EngineError::Unavailable => "storage_unavailable",
            EngineError::Storage(_) => "storage_error",
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UnknownJob(id) => EngineError::UnknownJob(id),
            StoreError::UnknownDevice(id) => EngineError::UnknownDevice(id),
            StoreError::Unavailable => EngineError::Unavailable,
            other => EngineError::Storage(other),
        }
    }
}

impl From<ProgressError> for EngineError {
    fn from(e: ProgressError) -> Self {
        match e {
            ProgressError::Stale { recorded, reported } => {
                EngineError::StaleProgress { recorded, reported }
            }
            other => EngineError::Progress(other),
        }
    }
}
