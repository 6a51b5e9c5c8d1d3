// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! plotd: configuration, lifecycle, wire protocol and the connection manager

pub mod config;
pub mod connection;
pub mod lifecycle;
pub mod protocol;
pub mod server;

#[cfg(test)]
mod test_support;

pub use config::{Config, ConfigError};
pub use connection::ConnectionState;
pub use lifecycle::{startup, DaemonState, LifecycleError, Paths};
pub use protocol::{CloseReason, Envelope, ProtocolError, Request, Response, PROTOCOL_VERSION};
pub use server::{ConnectionManager, ServerConfig, ServerError};
