// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection manager fixture backed by a fake clock

use std::sync::Arc;

use plot_core::{EventBus, FakeClock, SequentialIdGen};
use plot_engine::{EngineConfig, EngineDeps, Service};
use plot_storage::{Availability, DeviceRegistry, JobStore};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::protocol::{self, Envelope, Request};
use crate::server::{ConnectionManager, ServerConfig};

pub type TestManager = ConnectionManager<FakeClock, SequentialIdGen>;

pub fn manager(config: ServerConfig, queue_capacity: usize) -> Arc<TestManager> {
    let availability = Availability::new();
    let deps = EngineDeps::new(
        JobStore::new(availability.clone()),
        DeviceRegistry::new(availability),
        EventBus::new(queue_capacity),
        FakeClock::new(),
    );
    let service = Service::new(deps, SequentialIdGen::default(), EngineConfig::default());
    Arc::new(ConnectionManager::new(service, config))
}

pub async fn send<W: AsyncWrite + Unpin>(writer: &mut W, request: &Request) {
    let data = protocol::encode(request).unwrap();
    protocol::write_message(writer, &data).await.unwrap();
}

pub async fn recv<R: AsyncRead + Unpin>(reader: &mut R) -> Envelope {
    let bytes = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        protocol::read_message(reader),
    )
    .await
    .unwrap()
    .unwrap();
    protocol::decode(&bytes).unwrap()
}
