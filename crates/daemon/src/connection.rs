// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One client connection: a reader task and a writer task.
//!
//! The reader decodes requests and queues replies for the writer. The writer
//! owns the socket's write half and the connection's event stream, and stamps
//! every outbound message with the next sequence number. A connection moves
//! through Connecting, Authenticated and Subscribed before it is Closed.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use plot_core::{ChannelSet, Clock, EventStream, IdGen, SlowConsumer, SubscriberId};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::protocol::{
    self, CloseReason, Envelope, ProtocolError, Request, Response, PROTOCOL_VERSION,
};
use crate::server::{ConnectionManager, ServerError};

/// Replies waiting for the writer
const REPLY_CAPACITY: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Authenticated,
    Subscribed(ChannelSet),
    Closed,
}

impl ConnectionState {
    /// State after a subscribe or unsubscribe left `channels`
    fn with_channels(channels: ChannelSet) -> Self {
        if channels.is_empty() {
            ConnectionState::Authenticated
        } else {
            ConnectionState::Subscribed(channels)
        }
    }
}

/// Serve one client until it disconnects, is closed, or the daemon stops
pub async fn serve<C: Clock, I: IdGen>(
    manager: Arc<ConnectionManager<C, I>>,
    stream: TcpStream,
    peer: SocketAddr,
    shutdown: watch::Receiver<bool>,
) -> Result<(), ServerError> {
    let events = manager.service().bus().register();
    let id = events.id();
    manager.register(id, peer);

    let (reader, writer) = stream.into_split();
    let (replies_tx, replies_rx) = mpsc::channel(REPLY_CAPACITY);
    let write_timeout = manager.config().write_timeout;

    let writer_task = tokio::spawn(write_loop(
        id,
        writer,
        events,
        replies_rx,
        shutdown,
        write_timeout,
    ));
    let reader_task = tokio::spawn(read_loop(Arc::clone(&manager), id, reader, replies_tx));

    // The writer finishes last: it drains replies until the reader hangs up
    let written = writer_task.await;
    reader_task.abort();
    manager.unregister(id);

    match written {
        Ok(result) => result.map_err(ServerError::from),
        Err(e) => {
            warn!(connection = %id, error = %e, "writer task failed");
            Ok(())
        }
    }
}

/// Decode requests and queue their replies until the peer goes away.
///
/// The connection's state is kept current in the manager's table.
pub(crate) async fn read_loop<C: Clock, I: IdGen, R: AsyncRead + Unpin>(
    manager: Arc<ConnectionManager<C, I>>,
    id: SubscriberId,
    mut reader: R,
    replies: mpsc::Sender<Response>,
) {
    debug!(connection = %id, "awaiting hello");

    match handshake(&manager, id, &mut reader).await {
        Ok(reply) => {
            manager.set_state(id, ConnectionState::Authenticated);
            if replies.send(reply).await.is_err() {
                manager.set_state(id, ConnectionState::Closed);
                return;
            }
        }
        Err(Some(reason)) => {
            info!(connection = %id, reason = reason.as_str(), "handshake refused");
            manager.set_state(id, ConnectionState::Closed);
            let _ = replies.send(Response::Closed { reason }).await;
            return;
        }
        Err(None) => {
            manager.set_state(id, ConnectionState::Closed);
            return;
        }
    }

    loop {
        let bytes = match protocol::read_message(&mut reader).await {
            Ok(bytes) => bytes,
            Err(ProtocolError::ConnectionClosed) => {
                debug!(connection = %id, "client disconnected");
                break;
            }
            Err(ProtocolError::TooLarge(len)) => {
                // Framing is lost past an oversized frame
                warn!(connection = %id, len, "oversized frame");
                let _ = replies
                    .send(Response::error("invalid_request", format!("frame of {len} bytes is too large")))
                    .await;
                break;
            }
            Err(e) => {
                debug!(connection = %id, error = %e, "read failed");
                break;
            }
        };

        let reply = match protocol::decode::<Request>(&bytes) {
            Ok(request) => {
                debug!(connection = %id, ?request, "request");
                let reply = manager.handle_request(id, request);
                match &reply {
                    Response::Subscribed { channels, .. } | Response::Unsubscribed { channels } => {
                        let state = ConnectionState::with_channels(channels.iter().copied().collect());
                        manager.set_state(id, state);
                    }
                    _ => {}
                }
                reply
            }
            Err(e) => Response::error("invalid_request", e.to_string()),
        };

        if replies.send(reply).await.is_err() {
            break;
        }
    }

    manager.set_state(id, ConnectionState::Closed);
}

/// Wait for a valid hello. `Err(None)` means the peer left before sending one.
async fn handshake<C: Clock, I: IdGen, R: AsyncRead + Unpin>(
    manager: &ConnectionManager<C, I>,
    id: SubscriberId,
    reader: &mut R,
) -> Result<Response, Option<CloseReason>> {
    let config = manager.config();
    let request = match protocol::read_request(reader, config.handshake_timeout).await {
        Ok(request) => request,
        Err(ProtocolError::Json(_)) | Err(ProtocolError::Timeout) => {
            return Err(Some(CloseReason::HandshakeRequired))
        }
        Err(_) => return Err(None),
    };

    let Request::Hello { version, token } = request else {
        return Err(Some(CloseReason::HandshakeRequired));
    };
    if version != PROTOCOL_VERSION {
        return Err(Some(CloseReason::UnsupportedVersion));
    }
    if let Some(expected) = &config.auth_token {
        if token.as_deref() != Some(expected.as_str()) {
            return Err(Some(CloseReason::Unauthorized));
        }
    }

    debug!(connection = %id, "handshake complete");
    Ok(Response::Hello {
        connection_id: id.to_string(),
        version: PROTOCOL_VERSION.to_string(),
    })
}

/// Write replies and subscribed events in order, numbering each one
pub(crate) async fn write_loop<W: AsyncWrite + Unpin>(
    id: SubscriberId,
    mut writer: W,
    mut events: EventStream,
    mut replies: mpsc::Receiver<Response>,
    mut shutdown: watch::Receiver<bool>,
    write_timeout: Duration,
) -> Result<(), ProtocolError> {
    let mut seq = 0u64;
    let mut stamp = |message: Response| {
        seq += 1;
        Envelope { seq, message }
    };

    loop {
        let message = tokio::select! {
            biased;
            _ = shutdown.changed() => {
                // Best effort, the daemon is stopping
                let _ = protocol::write_envelope(
                    &mut writer,
                    &stamp(Response::Closed { reason: CloseReason::Shutdown }),
                    write_timeout,
                )
                .await;
                return Ok(());
            }
            reply = replies.recv() => match reply {
                Some(reply) => reply,
                None => return Ok(()),
            },
            event = events.recv() => match event {
                Ok(Some(event)) => Response::from_event(&event),
                Ok(None) => return Ok(()),
                Err(SlowConsumer) => {
                    warn!(connection = %id, "slow consumer, closing connection");
                    let _ = protocol::write_envelope(
                        &mut writer,
                        &stamp(Response::Closed { reason: CloseReason::SlowConsumer }),
                        write_timeout,
                    )
                    .await;
                    return Ok(());
                }
            },
        };

        let closing = matches!(message, Response::Closed { .. });
        protocol::write_envelope(&mut writer, &stamp(message), write_timeout).await?;
        if closing {
            return Ok(());
        }
    }
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
