// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire protocol between plotd and its clients.
//!
//! Every frame is a 4-byte big-endian length followed by one JSON object.
//! Messages are tagged by a `type` field. Outbound messages are wrapped in an
//! [`Envelope`] that carries the per-connection sequence number.

use std::time::Duration;

use chrono::{DateTime, Utc};
use plot_core::{
    Channel, Device, DeviceId, DeviceStatus, Event, EventPayload, EventType, Job, JobId,
    JobSpec, JobState, Progress, Severity,
};
use plot_engine::{JobAction, Summary};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Protocol version exchanged in the handshake
pub const PROTOCOL_VERSION: &str = "1";

/// Default timeout for handshakes and writes
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest frame either side accepts
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("timed out")]
    Timeout,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("message of {0} bytes exceeds the frame limit")]
    TooLarge(usize),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid message: {0}")]
    Json(#[from] serde_json::Error),
}

/// Messages sent by clients and device links
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// First message on every connection
    Hello {
        version: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },

    Ping,

    /// Channel names are validated server-side; empty means all
    Subscribe {
        #[serde(default)]
        channels: Vec<String>,
    },

    Unsubscribe {
        #[serde(default)]
        channels: Vec<String>,
    },

    JobControl { job_id: String, action: JobAction },

    ListJobs {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        state: Option<JobState>,
    },

    ListDevices,

    Status,

    CreateJob(JobSpec),

    Transition {
        job_id: String,
        state: JobState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    Heartbeat {
        device_id: DeviceId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        device_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        firmware_version: Option<String>,
    },

    Progress { job_id: String, progress: Progress },

    DeviceError { device_id: String, message: String },

    DeviceRecovered { device_id: String },
}

/// Why the server closed a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    SlowConsumer,
    Unauthorized,
    HandshakeRequired,
    UnsupportedVersion,
    Shutdown,
}

impl CloseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            CloseReason::SlowConsumer => "slow_consumer",
            CloseReason::Unauthorized => "unauthorized",
            CloseReason::HandshakeRequired => "handshake_required",
            CloseReason::UnsupportedVersion => "unsupported_version",
            CloseReason::Shutdown => "shutdown",
        }
    }
}

/// Job count for one state in a status reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCount {
    pub state: JobState,
    pub count: usize,
}

/// Messages sent by the server: replies to requests and broadcast events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Hello {
        connection_id: String,
        version: String,
    },

    Pong,

    Subscribed {
        channels: Vec<Channel>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        ignored: Vec<String>,
    },

    Unsubscribed {
        channels: Vec<Channel>,
    },

    JobControlResult {
        job_id: JobId,
        action: JobAction,
        status: JobState,
    },

    Job {
        job: Job,
    },

    Jobs {
        jobs: Vec<Job>,
    },

    Device {
        device: Device,
    },

    Devices {
        devices: Vec<Device>,
    },

    ProgressRecorded {
        job_id: JobId,
        progress: Progress,
    },

    Status {
        uptime_secs: u64,
        connections: usize,
        /// Connections holding at least one channel
        subscribed: usize,
        jobs: Vec<StateCount>,
        devices: usize,
        storage_available: bool,
    },

    Error {
        kind: String,
        message: String,
    },

    Closed {
        reason: CloseReason,
    },

    /// Job state change or progress; `metrics` is set for progress
    JobUpdate {
        event: EventType,
        job_id: JobId,
        status: JobState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        previous: Option<JobState>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        device_id: Option<DeviceId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metrics: Option<Progress>,
        timestamp: DateTime<Utc>,
    },

    DeviceUpdate {
        device_id: DeviceId,
        status: DeviceStatus,
        #[serde(default)]
        current_job_id: Option<JobId>,
        error_count: u64,
        last_heartbeat: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },

    /// System alert raised about one device
    DeviceAlert {
        device_id: DeviceId,
        severity: Severity,
        title: String,
        message: String,
        timestamp: DateTime<Utc>,
    },

    SystemAlert {
        severity: Severity,
        title: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl Response {
    pub fn error(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Response::Error {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn status(
        summary: Summary,
        uptime_secs: u64,
        connections: usize,
        subscribed: usize,
    ) -> Self {
        Response::Status {
            uptime_secs,
            connections,
            subscribed,
            jobs: summary
                .jobs
                .into_iter()
                .map(|(state, count)| StateCount { state, count })
                .collect(),
            devices: summary.devices,
            storage_available: summary.storage_available,
        }
    }

    /// Project a bus event onto its wire form
    pub fn from_event(event: &Event) -> Self {
        let timestamp = event.timestamp;
        match &event.payload {
            EventPayload::JobStateChange {
                job_id,
                from,
                to,
                reason,
                device_id,
            } => Response::JobUpdate {
                event: EventType::JobStateChange,
                job_id: job_id.clone(),
                status: *to,
                previous: *from,
                reason: Some(reason.clone()),
                device_id: device_id.clone(),
                metrics: None,
                timestamp,
            },
            // Progress is only accepted while running
            EventPayload::JobProgress { job_id, progress } => Response::JobUpdate {
                event: EventType::JobProgress,
                job_id: job_id.clone(),
                status: JobState::Running,
                previous: None,
                reason: None,
                device_id: None,
                metrics: Some(progress.clone()),
                timestamp,
            },
            EventPayload::DeviceStatus {
                device_id,
                status,
                current_job_id,
                error_count,
                last_heartbeat,
            } => Response::DeviceUpdate {
                device_id: device_id.clone(),
                status: *status,
                current_job_id: current_job_id.clone(),
                error_count: *error_count,
                last_heartbeat: *last_heartbeat,
                timestamp,
            },
            EventPayload::SystemAlert {
                severity,
                title,
                message,
                source: Some(device_id),
            } => Response::DeviceAlert {
                device_id: device_id.clone(),
                severity: *severity,
                title: title.clone(),
                message: message.clone(),
                timestamp,
            },
            EventPayload::SystemAlert {
                severity,
                title,
                message,
                source: None,
            } => Response::SystemAlert {
                severity: *severity,
                title: title.clone(),
                message: message.clone(),
                timestamp,
            },
        }
    }
}

/// An outbound message stamped with its per-connection sequence number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub seq: u64,
    #[serde(flatten)]
    pub message: Response,
}

/// Serialize a message to JSON (no length prefix)
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(message)?)
}

/// Deserialize a message from JSON
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Write one length-prefixed frame
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    data: &[u8],
) -> Result<(), ProtocolError> {
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::TooLarge(data.len()));
    }
    let len = data.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed frame
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, ProtocolError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::ConnectionClosed);
        }
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::TooLarge(len));
    }

    let mut buf = vec![0u8; len];
    match reader.read_exact(&mut buf).await {
        Ok(_) => Ok(buf),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(ProtocolError::ConnectionClosed)
        }
        Err(e) => Err(e.into()),
    }
}

/// Read and decode a request, failing after `timeout`
pub async fn read_request<R: AsyncRead + Unpin>(
    reader: &mut R,
    timeout: Duration,
) -> Result<Request, ProtocolError> {
    let bytes = tokio::time::timeout(timeout, read_message(reader))
        .await
        .map_err(|_| ProtocolError::Timeout)??;
    decode(&bytes)
}

/// Encode and write an outbound message, failing after `timeout`
pub async fn write_envelope<W: AsyncWrite + Unpin>(
    writer: &mut W,
    envelope: &Envelope,
    timeout: Duration,
) -> Result<(), ProtocolError> {
    let data = encode(envelope)?;
    tokio::time::timeout(timeout, write_message(writer, &data))
        .await
        .map_err(|_| ProtocolError::Timeout)?
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
