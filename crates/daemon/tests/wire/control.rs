// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::prelude::*;

#[tokio::test]
async fn job_control_replies_to_the_requester_and_broadcasts() {
    let server = Server::start().await;
    let job = server.running("grid", "axidraw-1");
    let mut watcher = server.subscriber(&["jobs"]).await;
    let mut control = server.client().await;

    let reply = control
        .request(Request::JobControl {
            job_id: job.to_string(),
            action: JobAction::Pause,
        })
        .await;
    assert_eq!(
        reply,
        Response::JobControlResult {
            job_id: job.clone(),
            action: JobAction::Pause,
            status: JobState::Paused,
        }
    );

    let (job_id, previous, status, reason) = state_change(&watcher.event().await);
    assert_eq!(job_id, job);
    assert_eq!(previous, Some(JobState::Running));
    assert_eq!(status, JobState::Paused);
    assert_eq!(reason, "user request");
    // The result is not broadcast
    watcher.assert_quiet().await;
    control.assert_quiet().await;
}

#[tokio::test]
async fn cancelling_a_finished_job_is_refused() {
    let server = Server::start().await;
    let job = server.running("grid", "axidraw-1");
    server
        .service
        .request_transition(job.as_str(), JobState::Completed, Some("done"))
        .unwrap();
    let mut control = server.client().await;

    match control
        .request(Request::JobControl {
            job_id: job.to_string(),
            action: JobAction::Cancel,
        })
        .await
    {
        Response::Error { kind, .. } => assert_eq!(kind, "invalid_transition"),
        other => panic!("unexpected reply: {other:?}"),
    }
    assert_eq!(
        server.service.get_job(job.as_str()).unwrap().state,
        JobState::Completed
    );
}

#[tokio::test]
async fn list_jobs_resyncs_a_late_client() {
    let server = Server::start().await;
    let running = server.running("first", "axidraw-1");
    let created = server.service.create_job(JobSpec::new("second", 1)).unwrap().id;
    let mut client = server.client().await;

    match client.request(Request::ListJobs { state: None }).await {
        Response::Jobs { jobs } => {
            let mut seen: Vec<_> = jobs.iter().map(|j| (j.id.clone(), j.state)).collect();
            seen.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
            let mut expected = vec![(running, JobState::Running), (created, JobState::Created)];
            expected.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
            assert_eq!(seen, expected);
        }
        other => panic!("unexpected reply: {other:?}"),
    }

    match client.request(Request::ListDevices).await {
        Response::Devices { devices } => {
            assert_eq!(devices.len(), 1);
            assert_eq!(devices[0].status, DeviceStatus::Busy);
        }
        other => panic!("unexpected reply: {other:?}"),
    }
}

#[tokio::test]
async fn malformed_frames_leave_the_connection_open() {
    let server = Server::start().await;
    let mut client = server.client().await;

    client.send_raw(b"{\"type\":\"teleport\"}").await;
    match client.recv().await {
        Response::Error { kind, .. } => assert_eq!(kind, "invalid_request"),
        other => panic!("unexpected reply: {other:?}"),
    }
    assert_eq!(client.request(Request::Ping).await, Response::Pong);
}
