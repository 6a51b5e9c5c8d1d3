// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Channels and per-connection subscriptions

use crate::event::{Event, EventType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A named category of events
///
/// `All` is a channel of its own: it matches every event, and unsubscribing
/// from `jobs` does not narrow an `all` subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Jobs,
    Devices,
    System,
    All,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Channel::Jobs, Channel::Devices, Channel::System, Channel::All];

    /// The channel an event type is published on
    pub fn for_event(event_type: EventType) -> Channel {
        match event_type {
            EventType::JobStateChange | EventType::JobProgress => Channel::Jobs,
            EventType::DeviceStatus => Channel::Devices,
            EventType::SystemAlert => Channel::System,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Jobs => "jobs",
            Channel::Devices => "devices",
            Channel::System => "system",
            Channel::All => "all",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::ALL
            .into_iter()
            .find(|c| c.as_str() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| ChannelError::NoValidChannels(vec![s.to_string()]))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("no valid channels in request: {}", .0.join(", "))]
    NoValidChannels(Vec<String>),
}

/// Result of parsing the channel names a client asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestedChannels {
    pub channels: Vec<Channel>,
    /// Names that were not recognised and were skipped
    pub ignored: Vec<String>,
}

/// Parse client channel names.
///
/// An empty request means `all`. Unknown names are skipped, but a request made
/// only of unknown names is an error.
pub fn parse_channels<S: AsRef<str>>(names: &[S]) -> Result<RequestedChannels, ChannelError> {
    if names.is_empty() {
        return Ok(RequestedChannels {
            channels: vec![Channel::All],
            ignored: Vec::new(),
        });
    }

    let mut channels = Vec::new();
    let mut ignored = Vec::new();
    for name in names {
        match name.as_ref().parse::<Channel>() {
            Ok(channel) if !channels.contains(&channel) => channels.push(channel),
            Ok(_) => {}
            Err(_) => ignored.push(name.as_ref().to_string()),
        }
    }

    if channels.is_empty() {
        return Err(ChannelError::NoValidChannels(ignored));
    }
    Ok(RequestedChannels { channels, ignored })
}

/// Subscriber handle; the connection id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriberId(pub u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// The set of channels one connection receives
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSet(BTreeSet<Channel>);

impl ChannelSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_all(&mut self, channels: impl IntoIterator<Item = Channel>) {
        self.0.extend(channels);
    }

    pub fn remove_all(&mut self, channels: impl IntoIterator<Item = Channel>) {
        for channel in channels {
            self.0.remove(&channel);
        }
    }

    pub fn contains(&self, channel: Channel) -> bool {
        self.0.contains(&channel)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Channel> + '_ {
        self.0.iter().copied()
    }

    /// Whether an event should be delivered to this set
    pub fn matches(&self, event: &Event) -> bool {
        self.0.contains(&Channel::All) || self.0.contains(&Channel::for_event(event.event_type()))
    }
}

impl FromIterator<Channel> for ChannelSet {
    fn from_iter<T: IntoIterator<Item = Channel>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
#[path = "subscription_tests.rs"]
mod tests;
