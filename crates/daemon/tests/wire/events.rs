// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::prelude::*;

fn created(reply: Response) -> JobId {
    match reply {
        Response::Job { job } => job.id,
        other => panic!("unexpected reply: {other:?}"),
    }
}

#[tokio::test]
async fn subscribers_see_each_job_change_once_in_order() {
    let server = Server::start().await;
    let mut jobs = server.subscriber(&["jobs"]).await;
    let mut everything = server.subscriber(&[]).await;
    let mut control = server.client().await;

    let job = created(
        control
            .request(Request::CreateJob(JobSpec::new("grid", 1)))
            .await,
    );
    control
        .request(Request::Transition {
            job_id: job.to_string(),
            state: JobState::Queued,
            reason: None,
        })
        .await;

    let expected = [
        (None, JobState::Created, "created"),
        (Some(JobState::Created), JobState::Queued, "user request"),
    ];
    for (previous, status, reason) in expected {
        let change = state_change(&jobs.event().await);
        assert_eq!(change, (job.clone(), previous, status, reason.to_string()));
        let change = state_change(&everything.event().await);
        assert_eq!(change, (job.clone(), previous, status, reason.to_string()));
    }
    jobs.assert_quiet().await;
    // The requester did not subscribe
    control.assert_quiet().await;
}

#[tokio::test]
async fn queued_job_waits_for_a_device() {
    let server = Server::start().await;
    let mut all = server.subscriber(&["all"]).await;
    let mut control = server.client().await;

    let job = created(
        control
            .request(Request::CreateJob(JobSpec::new("spiral", 2)))
            .await,
    );
    control
        .request(Request::Transition {
            job_id: job.to_string(),
            state: JobState::Queued,
            reason: None,
        })
        .await;
    assert!(server.service.scheduler().schedule().unwrap().is_empty());

    let reply = control
        .request(Request::Heartbeat {
            device_id: DeviceId::new("axidraw-1"),
            timestamp: None,
            device_type: Some("axidraw".into()),
            firmware_version: Some("2.7.0".into()),
        })
        .await;
    assert!(matches!(reply, Response::Device { device } if device.status == DeviceStatus::Connected));

    let admitted = server.service.scheduler().schedule().unwrap();
    assert_eq!(admitted.len(), 1);

    assert_eq!(state_change(&all.event().await).2, JobState::Created);
    assert_eq!(state_change(&all.event().await).2, JobState::Queued);
    match all.event().await {
        Response::DeviceUpdate {
            device_id, status, ..
        } => {
            assert_eq!(device_id.as_str(), "axidraw-1");
            assert_eq!(status, DeviceStatus::Connected);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    let (_, previous, status, reason) = state_change(&all.event().await);
    assert_eq!(previous, Some(JobState::Queued));
    assert_eq!(status, JobState::Running);
    assert_eq!(reason, "scheduled");
    match all.event().await {
        Response::DeviceUpdate {
            status,
            current_job_id,
            ..
        } => {
            assert_eq!(status, DeviceStatus::Busy);
            assert_eq!(current_job_id, Some(job));
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn progress_reaches_job_subscribers() {
    let server = Server::start().await;
    let job = server.running("grid", "axidraw-1");
    let mut jobs = server.subscriber(&["jobs"]).await;
    let mut control = server.client().await;

    let reply = control
        .request(Request::Progress {
            job_id: job.to_string(),
            progress: plot_core::Progress {
                percentage: 25.0,
                points_plotted: 250,
                total_points: 1000,
                ..Default::default()
            },
        })
        .await;
    assert!(matches!(reply, Response::ProgressRecorded { .. }), "{reply:?}");

    match jobs.event().await {
        Response::JobUpdate {
            event,
            job_id,
            status,
            metrics: Some(metrics),
            ..
        } => {
            assert_eq!(event, EventType::JobProgress);
            assert_eq!(job_id, job);
            assert_eq!(status, JobState::Running);
            assert_eq!(metrics.points_plotted, 250);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn silent_device_fails_its_job() {
    let server = Server::start().await;
    let job = server.running("grid", "axidraw-1");
    let mut all = server.subscriber(&["all"]).await;

    server.advance(31);
    let demoted = server.service.monitor().sweep().unwrap();
    assert_eq!(demoted.len(), 1);

    match all.event().await {
        Response::DeviceUpdate { status, .. } => assert_eq!(status, DeviceStatus::Offline),
        other => panic!("unexpected event: {other:?}"),
    }
    let (job_id, previous, status, reason) = state_change(&all.event().await);
    assert_eq!(job_id, job);
    assert_eq!(previous, Some(JobState::Running));
    assert_eq!(status, JobState::Failed);
    assert_eq!(reason, "device offline");
    match all.event().await {
        Response::DeviceAlert {
            device_id,
            severity,
            ..
        } => {
            assert_eq!(device_id.as_str(), "axidraw-1");
            assert_eq!(severity, Severity::Warning);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn unsubscribed_channels_go_quiet() {
    let server = Server::start().await;
    let mut client = server.subscriber(&["jobs", "devices"]).await;

    let reply = client
        .request(Request::Unsubscribe {
            channels: vec!["jobs".into()],
        })
        .await;
    assert_eq!(
        reply,
        Response::Unsubscribed {
            channels: vec![Channel::Devices]
        }
    );

    server.service.create_job(JobSpec::new("grid", 1)).unwrap();
    client.assert_quiet().await;

    server
        .service
        .report_heartbeat(&DeviceId::new("axidraw-1"), None, Default::default())
        .unwrap();
    assert!(matches!(client.event().await, Response::DeviceUpdate { .. }));
}
