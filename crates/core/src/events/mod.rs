// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event fan-out to connected clients
//!
//! - `EventBus` routes published events to subscribers by channel
//! - `ChannelSet` is what one connection has asked to receive

mod bus;
mod subscription;

pub use bus::{BusError, EventBus, EventStream, SlowConsumer, DEFAULT_QUEUE_CAPACITY};
pub use subscription::{
    parse_channels, Channel, ChannelError, ChannelSet, RequestedChannels, SubscriberId,
};
