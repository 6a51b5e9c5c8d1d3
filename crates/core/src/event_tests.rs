// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::clock::{Clock, FakeClock};

#[test]
fn state_change_serializes_with_type_tag() {
    let clock = FakeClock::new();
    let event = Event::new(
        clock.now(),
        EventPayload::JobStateChange {
            job_id: JobId::new("job-1"),
            from: Some(JobState::Queued),
            to: JobState::Running,
            reason: "scheduled".to_string(),
            device_id: Some(DeviceId::new("axidraw-1")),
        },
    );

    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["payload"]["type"], "job_state_change");
    assert_eq!(json["payload"]["from"], "queued");
    assert_eq!(json["payload"]["to"], "running");
    assert_eq!(event.event_type().as_str(), "job_state_change");
}

#[test]
fn entity_accessors() {
    let clock = FakeClock::new();
    let progress = Event::new(
        clock.now(),
        EventPayload::JobProgress {
            job_id: JobId::new("job-2"),
            progress: Progress::default(),
        },
    );
    assert_eq!(progress.job_id(), Some(&JobId::new("job-2")));
    assert_eq!(progress.device_id(), None);

    let alert = Event::alert(
        clock.now(),
        Severity::Warning,
        "Device offline",
        "no heartbeat",
        Some(DeviceId::new("axidraw-1")),
    );
    assert_eq!(alert.event_type(), EventType::SystemAlert);
    assert_eq!(alert.job_id(), None);
    assert_eq!(alert.device_id(), Some(&DeviceId::new("axidraw-1")));
}

#[test]
fn severities_are_ordered() {
    assert!(Severity::Info < Severity::Warning);
    assert!(Severity::Error < Severity::Critical);
}
