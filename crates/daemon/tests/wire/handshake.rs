// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::prelude::*;

#[tokio::test]
async fn hello_then_ping() {
    let server = Server::start().await;
    let mut client = Client::connect(server.addr).await;

    match client.hello(None).await {
        Response::Hello {
            connection_id,
            version,
        } => {
            assert!(connection_id.starts_with("conn-"), "{connection_id}");
            assert_eq!(version, plot_daemon::PROTOCOL_VERSION);
        }
        other => panic!("unexpected reply: {other:?}"),
    }
    assert_eq!(client.request(Request::Ping).await, Response::Pong);
}

#[tokio::test]
async fn wrong_token_is_closed_as_unauthorized() {
    let config = ServerConfig {
        auth_token: Some("s3cret".into()),
        ..ServerConfig::default()
    };
    let server = Server::start_with(config, 16).await;

    let mut client = Client::connect(server.addr).await;
    assert_eq!(
        client.hello(Some("guess")).await,
        Response::Closed {
            reason: CloseReason::Unauthorized
        }
    );
    client.assert_eof().await;

    let mut client = Client::connect(server.addr).await;
    assert!(matches!(client.hello(Some("s3cret")).await, Response::Hello { .. }));
}

#[tokio::test]
async fn requests_before_hello_close_the_connection() {
    let server = Server::start().await;
    let mut client = Client::connect(server.addr).await;

    assert_eq!(
        client.request(Request::ListJobs { state: None }).await,
        Response::Closed {
            reason: CloseReason::HandshakeRequired
        }
    );
    client.assert_eof().await;
}

#[tokio::test]
async fn status_counts_open_connections() {
    let server = Server::start().await;
    let mut first = server.client().await;
    let _second = server.client().await;
    let _watcher = server.subscriber(&["jobs"]).await;

    match first.request(Request::Status).await {
        Response::Status {
            connections,
            subscribed,
            storage_available,
            ..
        } => {
            assert_eq!(connections, 3);
            assert_eq!(subscribed, 1);
            assert!(storage_available);
        }
        other => panic!("unexpected reply: {other:?}"),
    }
}

#[tokio::test]
async fn shutdown_closes_open_connections() {
    let server = Server::start().await;
    let mut client = server.client().await;

    server.stop();
    assert_eq!(
        client.recv().await,
        Response::Closed {
            reason: CloseReason::Shutdown
        }
    );
    client.assert_eof().await;
}
