// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job model and transition rules
//!
//! `Job` holds the pure rules only: which edges of the lifecycle are legal,
//! which timestamps each edge stamps, and how progress may advance. Locking and
//! event publication live in the engine.

use crate::id::{DeviceId, JobId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Created,
    Queued,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub const ALL: [JobState; 7] = [
        JobState::Created,
        JobState::Queued,
        JobState::Running,
        JobState::Paused,
        JobState::Completed,
        JobState::Failed,
        JobState::Cancelled,
    ];

    /// Completed, Failed and Cancelled have no outgoing edges
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }

    /// Running or Paused: the job holds a device
    pub fn is_active(self) -> bool {
        matches!(self, JobState::Running | JobState::Paused)
    }

    /// Whether `self -> target` is an edge of the lifecycle
    pub fn can_transition_to(self, target: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, target),
            (Created, Queued)
                | (Created, Cancelled)
                | (Queued, Running)
                | (Queued, Cancelled)
                | (Running, Paused)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Paused, Running)
                | (Paused, Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Created => "created",
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Paused => "paused",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = UnknownJobState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobState::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownJobState(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown job state: {0}")]
pub struct UnknownJobState(pub String);

/// Rejected state change; the job is left untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot move from {from} to {to}")]
pub struct InvalidTransition {
    pub from: JobState,
    pub to: JobState,
}

/// Rejected progress report; the recorded progress is left untouched
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProgressError {
    #[error("progress is only accepted while running (job is {state})")]
    NotRunning { state: JobState },
    #[error("stale progress: {reported} points reported, {recorded} already recorded")]
    Stale { recorded: u64, reported: u64 },
    #[error("invalid progress: {0}")]
    Invalid(String),
}

/// Plotting progress as reported by the device link
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub percentage: f64,
    pub current_layer: u32,
    pub total_layers: u32,
    pub points_plotted: u64,
    pub total_points: u64,
    #[serde(default)]
    pub estimated_seconds_remaining: Option<u64>,
    #[serde(default)]
    pub pen_down_seconds: Option<f64>,
}

impl Progress {
    fn validate(&self) -> Result<(), ProgressError> {
        if !self.percentage.is_finite() || !(0.0..=100.0).contains(&self.percentage) {
            return Err(ProgressError::Invalid(format!(
                "percentage {} outside 0-100",
                self.percentage
            )));
        }
        if self.total_layers > 0 && self.current_layer > self.total_layers {
            return Err(ProgressError::Invalid(format!(
                "layer {} of {}",
                self.current_layer, self.total_layers
            )));
        }
        if self.total_points > 0 && self.points_plotted > self.total_points {
            return Err(ProgressError::Invalid(format!(
                "{} of {} points",
                self.points_plotted, self.total_points
            )));
        }
        Ok(())
    }
}

/// Parameters supplied by whoever adds a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub name: String,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default = "default_paper")]
    pub paper: String,
    #[serde(default = "default_preset")]
    pub preset: String,
}

fn default_priority() -> i32 {
    1
}

fn default_paper() -> String {
    "A4".to_string()
}

fn default_preset() -> String {
    "fast".to_string()
}

impl JobSpec {
    pub fn new(name: impl Into<String>, priority: i32) -> Self {
        Self {
            name: name.into(),
            priority,
            paper: default_paper(),
            preset: default_preset(),
        }
    }

    pub fn with_paper(mut self, paper: impl Into<String>) -> Self {
        self.paper = paper.into();
        self
    }

    pub fn with_preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = preset.into();
        self
    }
}

/// A plotting job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub name: String,
    pub state: JobState,
    pub priority: i32,
    pub paper: String,
    pub preset: String,
    pub device_id: Option<DeviceId>,
    pub progress: Progress,
    pub created_at: DateTime<Utc>,
    pub queued_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    /// Creation order, the last tie-break for admission
    pub sequence: u64,
}

impl Job {
    pub fn new(id: JobId, spec: JobSpec, sequence: u64, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: spec.name,
            state: JobState::Created,
            priority: spec.priority,
            paper: spec.paper,
            preset: spec.preset,
            device_id: None,
            progress: Progress::default(),
            created_at: now,
            queued_at: None,
            started_at: None,
            completed_at: None,
            error: None,
            sequence,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Apply `self.state -> target`, stamping timestamps. Returns the previous state.
    ///
    /// `reason` becomes the error message when the target is Failed.
    pub fn transition(
        &mut self,
        target: JobState,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<JobState, InvalidTransition> {
        let from = self.state;
        if !from.can_transition_to(target) {
            return Err(InvalidTransition { from, to: target });
        }

        // Timestamps stay ordered even if the wall clock steps backwards
        let now = now.max(self.latest_timestamp());

        self.state = target;
        match target {
            JobState::Queued => self.queued_at = Some(now),
            JobState::Running => {
                if self.started_at.is_none() {
                    self.started_at = Some(now);
                }
            }
            JobState::Failed => self.error = Some(reason.to_string()),
            _ => {}
        }
        if target.is_terminal() {
            self.completed_at = Some(now);
        }
        Ok(from)
    }

    /// Record a progress report.
    ///
    /// Reports that move `points_plotted` backwards are rejected so duplicate
    /// or reordered delivery is visible to the caller. Percentage and layer
    /// never decrease.
    pub fn record_progress(&mut self, progress: Progress) -> Result<&Progress, ProgressError> {
        if self.state != JobState::Running {
            return Err(ProgressError::NotRunning { state: self.state });
        }
        progress.validate()?;
        if progress.points_plotted < self.progress.points_plotted {
            return Err(ProgressError::Stale {
                recorded: self.progress.points_plotted,
                reported: progress.points_plotted,
            });
        }

        let previous = std::mem::replace(&mut self.progress, progress);
        self.progress.percentage = self.progress.percentage.max(previous.percentage);
        self.progress.current_layer = self.progress.current_layer.max(previous.current_layer);
        Ok(&self.progress)
    }

    fn latest_timestamp(&self) -> DateTime<Utc> {
        [self.queued_at, self.started_at, self.completed_at]
            .into_iter()
            .flatten()
            .fold(self.created_at, |latest, t| latest.max(t))
    }
}

/// Admission order: highest priority first, then earliest queued, then creation order
pub fn admission_order(a: &Job, b: &Job) -> Ordering {
    let key = |job: &Job| (Reverse(job.priority), job.queued_at, job.sequence);
    key(a).cmp(&key(b))
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
