// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! plot-core: domain model for the plot job tracker
//!
//! This crate provides:
//! - Pure job and device state rules (`job`, `device`)
//! - Events and the channel-routed event bus (`event`, `events`)
//! - Clock and id abstractions so the engine can be tested deterministically

pub mod clock;
pub mod device;
pub mod event;
pub mod events;
pub mod id;
pub mod job;

pub use clock::{Clock, FakeClock, SystemClock};
pub use device::{Device, DeviceInfo, DeviceStatus};
pub use event::{Event, EventPayload, EventType, Severity};
pub use events::{
    parse_channels, BusError, Channel, ChannelError, ChannelSet, EventBus, EventStream,
    RequestedChannels, SlowConsumer, SubscriberId, DEFAULT_QUEUE_CAPACITY,
};
pub use id::{DeviceId, IdGen, JobId, SequentialIdGen, UuidIdGen};
pub use job::{
    admission_order, InvalidTransition, Job, JobSpec, JobState, Progress, ProgressError,
};
