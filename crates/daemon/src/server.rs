// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection manager: accepts TCP clients and dispatches their requests.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use plot_core::{parse_channels, Channel, Clock, DeviceInfo, IdGen, SubscriberId};
use plot_engine::{EngineError, Service};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::connection::{self, ConnectionState};
use crate::protocol::{ProtocolError, Request, Response, DEFAULT_TIMEOUT};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub auth_token: Option<String>,
    pub handshake_timeout: Duration,
    pub write_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            auth_token: None,
            handshake_timeout: DEFAULT_TIMEOUT,
            write_timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// A live connection as seen by `status`
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub peer: SocketAddr,
    pub opened_at: Instant,
    pub state: ConnectionState,
}

/// Owns the set of live connections and the service they talk to
pub struct ConnectionManager<C: Clock, I: IdGen> {
    service: Service<C, I>,
    config: ServerConfig,
    connections: Mutex<HashMap<SubscriberId, ConnectionInfo>>,
    started_at: Instant,
}

impl<C: Clock, I: IdGen> ConnectionManager<C, I> {
    pub fn new(service: Service<C, I>, config: ServerConfig) -> Self {
        Self {
            service,
            config,
            connections: Mutex::new(HashMap::new()),
            started_at: Instant::now(),
        }
    }

    pub fn service(&self) -> &Service<C, I> {
        &self.service
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn connection_count(&self) -> usize {
        self.connections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Connections that hold at least one channel subscription
    pub fn subscribed_count(&self) -> usize {
        self.connections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|conn| matches!(conn.state, ConnectionState::Subscribed(_)))
            .count()
    }

    pub fn connection_state(&self, id: SubscriberId) -> Option<ConnectionState> {
        self.connections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .map(|conn| conn.state.clone())
    }

    pub(crate) fn set_state(&self, id: SubscriberId, state: ConnectionState) {
        let mut connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(conn) = connections.get_mut(&id) {
            debug!(connection = %id, from = ?conn.state, to = ?state, "connection state");
            conn.state = state;
        }
    }

    pub(crate) fn register(&self, id: SubscriberId, peer: SocketAddr) {
        let mut connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        connections.insert(
            id,
            ConnectionInfo {
                peer,
                opened_at: Instant::now(),
                state: ConnectionState::Connecting,
            },
        );
        info!(connection = %id, %peer, open = connections.len(), "connection opened");
    }

    pub(crate) fn unregister(&self, id: SubscriberId) {
        let mut connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(conn) = connections.remove(&id) {
            info!(
                connection = %id,
                peer = %conn.peer,
                secs = conn.opened_at.elapsed().as_secs(),
                "connection closed"
            );
        }
    }

    /// Accept connections until shutdown is signalled
    pub async fn run(self: Arc<Self>, listener: TcpListener, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                result = listener.accept() => match result {
                    Ok((stream, peer)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!(%peer, error = %e, "set_nodelay failed");
                        }
                        let manager = Arc::clone(&self);
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = connection::serve(manager, stream, peer, shutdown).await {
                                error!(%peer, error = %e, "connection error");
                            }
                        });
                    }
                    Err(e) => error!(error = %e, "error accepting connection"),
                },
                _ = shutdown.changed() => break,
            }
        }
        debug!("accept loop stopped");
    }

    /// Handle one request from an authenticated connection
    pub(crate) fn handle_request(&self, id: SubscriberId, request: Request) -> Response {
        match request {
            Request::Hello { .. } => Response::error("invalid_request", "already authenticated"),

            Request::Ping => Response::Pong,

            Request::Subscribe { channels } => {
                let requested = match parse_channels(&channels) {
                    Ok(requested) => requested,
                    Err(e) => return Response::error("invalid_channels", e.to_string()),
                };
                if !requested.ignored.is_empty() {
                    warn!(connection = %id, ignored = ?requested.ignored, "ignoring unknown channels");
                }
                match self.service.bus().subscribe(id, requested.channels) {
                    Ok(set) => Response::Subscribed {
                        channels: set.iter().collect(),
                        ignored: requested.ignored,
                    },
                    Err(e) => Response::error("invalid_request", e.to_string()),
                }
            }

            Request::Unsubscribe { channels } => {
                // An empty list drops every channel
                let remove = if channels.is_empty() {
                    Channel::ALL.to_vec()
                } else {
                    match parse_channels(&channels) {
                        Ok(requested) => requested.channels,
                        Err(e) => return Response::error("invalid_channels", e.to_string()),
                    }
                };
                match self.service.bus().unsubscribe(id, remove) {
                    Ok(set) => Response::Unsubscribed {
                        channels: set.iter().collect(),
                    },
                    Err(e) => Response::error("invalid_request", e.to_string()),
                }
            }

            Request::JobControl { job_id, action } => {
                match self.service.job_control(&job_id, action) {
                    Ok(job) => Response::JobControlResult {
                        job_id: job.id,
                        action,
                        status: job.state,
                    },
                    Err(e) => engine_error(id, e),
                }
            }

            Request::ListJobs { state } => Response::Jobs {
                jobs: self.service.list_jobs(state),
            },

            Request::ListDevices => Response::Devices {
                devices: self.service.list_devices(),
            },

            Request::Status => Response::status(
                self.service.summary(),
                self.started_at.elapsed().as_secs(),
                self.connection_count(),
                self.subscribed_count(),
            ),

            Request::CreateJob(spec) => match self.service.create_job(spec) {
                Ok(job) => Response::Job { job },
                Err(e) => engine_error(id, e),
            },

            Request::Transition {
                job_id,
                state,
                reason,
            } => match self
                .service
                .request_transition(&job_id, state, reason.as_deref())
            {
                Ok(job) => Response::Job { job },
                Err(e) => engine_error(id, e),
            },

            Request::Heartbeat {
                device_id,
                timestamp,
                device_type,
                firmware_version,
            } => {
                let info = DeviceInfo {
                    device_type,
                    firmware_version,
                };
                match self.service.report_heartbeat(&device_id, timestamp, info) {
                    Ok(device) => Response::Device { device },
                    Err(e) => engine_error(id, e),
                }
            }

            Request::Progress { job_id, progress } => {
                match self.service.report_progress(&job_id, progress) {
                    Ok(progress) => match self.service.get_job(&job_id) {
                        Ok(job) => Response::ProgressRecorded {
                            job_id: job.id,
                            progress,
                        },
                        Err(e) => engine_error(id, e),
                    },
                    Err(e) => engine_error(id, e),
                }
            }

            Request::DeviceError { device_id, message } => {
                match self.service.report_error(&device_id, &message) {
                    Ok(device) => Response::Device { device },
                    Err(e) => engine_error(id, e),
                }
            }

            Request::DeviceRecovered { device_id } => {
                match self.service.report_recovered(&device_id) {
                    Ok(device) => Response::Device { device },
                    Err(e) => engine_error(id, e),
                }
            }
        }
    }
}

fn engine_error(id: SubscriberId, error: EngineError) -> Response {
    match &error {
        EngineError::StaleProgress { .. } => debug!(connection = %id, %error, "ignoring stale progress"),
        EngineError::Storage(_) | EngineError::Unavailable => {
            warn!(connection = %id, %error, "request refused")
        }
        _ => debug!(connection = %id, %error, "request rejected"),
    }
    Response::error(error.kind(), error.to_string())
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
