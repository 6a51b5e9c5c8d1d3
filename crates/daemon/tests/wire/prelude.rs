// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test prelude: an in-process server on an ephemeral port and a wire client

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

pub use plot_core::{
    Channel, DeviceId, DeviceInfo, DeviceStatus, EventType, FakeClock, JobId, JobSpec, JobState,
    SequentialIdGen, Severity,
};
pub use plot_daemon::protocol::{self, CloseReason, Envelope, ProtocolError, Request, Response};
pub use plot_daemon::{ConnectionManager, ServerConfig};
pub use plot_engine::JobAction;

use plot_core::EventBus;
use plot_engine::{EngineConfig, EngineDeps, Service};
use plot_storage::{Availability, DeviceRegistry, JobStore};
use tokio::net::TcpStream;
use tokio::sync::watch;

const WAIT: Duration = Duration::from_secs(5);

pub type TestService = Service<FakeClock, SequentialIdGen>;

/// A running connection manager with direct access to its service
pub struct Server {
    pub clock: FakeClock,
    pub service: TestService,
    pub manager: Arc<ConnectionManager<FakeClock, SequentialIdGen>>,
    pub addr: SocketAddr,
    stop: watch::Sender<bool>,
}

impl Server {
    pub async fn start() -> Self {
        Self::start_with(ServerConfig::default(), 256).await
    }

    pub async fn start_with(config: ServerConfig, queue_capacity: usize) -> Self {
        let availability = Availability::new();
        let clock = FakeClock::new();
        let deps = EngineDeps::new(
            JobStore::new(availability.clone()),
            DeviceRegistry::new(availability),
            EventBus::new(queue_capacity),
            clock.clone(),
        );
        let service = Service::new(deps, SequentialIdGen::default(), EngineConfig::default());
        let manager = Arc::new(ConnectionManager::new(service.clone(), config));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, shutdown) = watch::channel(false);
        tokio::spawn(Arc::clone(&manager).run(listener, shutdown));

        Self {
            clock,
            service,
            manager,
            addr,
            stop,
        }
    }

    /// Connect and complete the handshake
    pub async fn client(&self) -> Client {
        let mut client = Client::connect(self.addr).await;
        match client.hello(None).await {
            Response::Hello { .. } => client,
            other => panic!("handshake failed: {other:?}"),
        }
    }

    /// Connect, handshake and subscribe
    pub async fn subscriber(&self, channels: &[&str]) -> Client {
        let mut client = self.client().await;
        let reply = client
            .request(Request::Subscribe {
                channels: channels.iter().map(|c| c.to_string()).collect(),
            })
            .await;
        assert!(matches!(reply, Response::Subscribed { .. }), "{reply:?}");
        client
    }

    /// A queued job admitted onto a fresh device
    pub fn running(&self, name: &str, device: &str) -> JobId {
        let job = self.service.create_job(JobSpec::new(name, 1)).unwrap().id;
        self.service
            .request_transition(job.as_str(), JobState::Queued, None)
            .unwrap();
        self.service
            .report_heartbeat(&DeviceId::new(device), None, DeviceInfo::default())
            .unwrap();
        let admitted = self.service.scheduler().schedule().unwrap();
        assert_eq!(admitted.len(), 1);
        job
    }

    pub fn advance(&self, secs: u64) {
        self.clock.advance(Duration::from_secs(secs));
    }

    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }
}

/// Wire client that checks sequence numbers as it reads
pub struct Client {
    stream: TcpStream,
    last_seq: u64,
}

impl Client {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        Self {
            stream,
            last_seq: 0,
        }
    }

    pub async fn hello(&mut self, token: Option<&str>) -> Response {
        self.request(Request::Hello {
            version: plot_daemon::PROTOCOL_VERSION.to_string(),
            token: token.map(str::to_string),
        })
        .await
    }

    pub async fn send(&mut self, request: &Request) {
        let data = protocol::encode(request).unwrap();
        protocol::write_message(&mut self.stream, &data).await.unwrap();
    }

    /// Write a frame without encoding a request
    pub async fn send_raw(&mut self, payload: &[u8]) {
        protocol::write_message(&mut self.stream, payload).await.unwrap();
    }

    /// Next outbound message; sequence numbers must have no gaps
    pub async fn recv(&mut self) -> Response {
        let bytes = tokio::time::timeout(WAIT, protocol::read_message(&mut self.stream))
            .await
            .expect("timed out waiting for a message")
            .expect("read failed");
        let envelope: Envelope = protocol::decode(&bytes).unwrap();
        assert_eq!(envelope.seq, self.last_seq + 1, "sequence gap");
        self.last_seq = envelope.seq;
        envelope.message
    }

    /// Send and return the reply, skipping broadcast events
    pub async fn request(&mut self, request: Request) -> Response {
        self.send(&request).await;
        loop {
            let message = self.recv().await;
            if !is_event(&message) {
                return message;
            }
        }
    }

    /// Next broadcast event, failing on anything else
    pub async fn event(&mut self) -> Response {
        let message = self.recv().await;
        assert!(is_event(&message), "expected an event, got {message:?}");
        message
    }

    /// Assert nothing arrives for a short while
    pub async fn assert_quiet(&mut self) {
        let read = tokio::time::timeout(
            Duration::from_millis(100),
            protocol::read_message(&mut self.stream),
        )
        .await;
        assert!(read.is_err(), "unexpected message: {read:?}");
    }

    /// The server has closed the connection
    pub async fn assert_eof(&mut self) {
        let read = tokio::time::timeout(WAIT, protocol::read_message(&mut self.stream))
            .await
            .expect("timed out waiting for close");
        assert!(matches!(read, Err(ProtocolError::ConnectionClosed) | Err(ProtocolError::Io(_))));
    }
}

pub fn is_event(message: &Response) -> bool {
    matches!(
        message,
        Response::JobUpdate { .. }
            | Response::DeviceUpdate { .. }
            | Response::DeviceAlert { .. }
            | Response::SystemAlert { .. }
    )
}

/// `(job_id, previous, status, reason)` of a job state change
pub fn state_change(message: &Response) -> (JobId, Option<JobState>, JobState, String) {
    match message {
        Response::JobUpdate {
            event: EventType::JobStateChange,
            job_id,
            previous,
            status,
            reason,
            ..
        } => (
            job_id.clone(),
            *previous,
            *status,
            reason.clone().unwrap_or_default(),
        ),
        other => panic!("expected a job state change, got {other:?}"),
    }
}
