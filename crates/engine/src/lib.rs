// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! plot-engine: job lifecycle, scheduling and device liveness

mod deps;
mod error;
pub mod heartbeat;
mod machine;
pub mod scheduler;
mod service;

#[cfg(test)]
mod test_support;

pub use deps::{EngineDeps, Wakeup};
pub use error::EngineError;
pub use heartbeat::{Demotion, HeartbeatConfig, HeartbeatMonitor, DEVICE_OFFLINE};
pub use machine::JobStateMachine;
pub use scheduler::{Admission, Scheduler, SchedulerConfig};
pub use service::{EngineConfig, JobAction, Service, Summary, USER_REQUEST};
