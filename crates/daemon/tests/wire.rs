// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Black-box tests of plotd over real TCP connections.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

#[path = "wire/prelude.rs"]
mod prelude;

#[path = "wire/handshake.rs"]
mod handshake;

#[path = "wire/events.rs"]
mod events;

#[path = "wire/control.rs"]
mod control;

#[path = "wire/backpressure.rs"]
mod backpressure;
