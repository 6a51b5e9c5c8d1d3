// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::prelude::*;

#[tokio::test]
async fn slow_subscriber_is_disconnected() {
    let server = Server::start_with(ServerConfig::default(), 4).await;
    let mut slow = server.subscriber(&["jobs"]).await;
    let mut control = server.client().await;

    // Publishing is synchronous, so the writer cannot drain in between
    for n in 0..16 {
        server
            .service
            .create_job(JobSpec::new(format!("job-{n}"), 1))
            .unwrap();
    }

    loop {
        match slow.recv().await {
            Response::JobUpdate { .. } => continue,
            Response::Closed { reason } => {
                assert_eq!(reason, CloseReason::SlowConsumer);
                break;
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
    slow.assert_eof().await;

    // Everyone else keeps working
    assert_eq!(control.request(Request::Ping).await, Response::Pong);
    // The slow connection is deregistered once its tasks wind down
    for _ in 0..50 {
        if server.manager.connection_count() == 1 {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    panic!("slow connection was never deregistered");
}
