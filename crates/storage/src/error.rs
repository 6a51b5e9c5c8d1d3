// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use plot_core::{DeviceId, JobId};
use std::io;
use thiserror::Error;

/// Errors from the stores and snapshot persistence
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown job: {0}")]
    UnknownJob(JobId),
    #[error("unknown device: {0}")]
    UnknownDevice(DeviceId),
    #[error("job already exists: {0}")]
    DuplicateJob(JobId),
    #[error("storage unavailable")]
    Unavailable,
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported snapshot version {0}")]
    Version(u32),
}
