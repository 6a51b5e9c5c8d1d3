// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use plot_core::{Clock, DeviceStatus, FakeClock, JobId};

#[test]
fn first_sighting_creates_connected_device() {
    let clock = FakeClock::new();
    let registry = DeviceRegistry::new(Availability::new());
    let id = DeviceId::new("axidraw-1");

    let (entry, created) = registry.get_or_create(&id, clock.now()).unwrap();
    assert!(created);
    assert_eq!(lock(&entry).status, DeviceStatus::Connected);

    let (_, created) = registry.get_or_create(&id, clock.now()).unwrap();
    assert!(!created);
    assert_eq!(registry.len(), 1);
}

#[test]
fn available_excludes_busy_and_errored_devices() {
    let clock = FakeClock::new();
    let registry = DeviceRegistry::new(Availability::new());
    for name in ["c", "a", "b"] {
        registry
            .get_or_create(&DeviceId::new(name), clock.now())
            .unwrap();
    }

    lock(&registry.entry("b").unwrap()).reserve(&JobId::new("job-1"));
    lock(&registry.entry("c").unwrap()).record_error("pen jam");

    let threshold = chrono::Duration::seconds(30);
    assert_eq!(
        registry.available(clock.now(), threshold),
        vec![DeviceId::new("a")]
    );
    assert_eq!(registry.holding_jobs(), 1);

    let ids: Vec<_> = registry.list().into_iter().map(|d| d.id).collect();
    assert_eq!(ids, vec!["a".into(), "b".into(), "c".into()]);
}

#[test]
fn available_excludes_silent_devices() {
    let clock = FakeClock::new();
    let registry = DeviceRegistry::new(Availability::new());
    registry
        .get_or_create(&DeviceId::new("quiet"), clock.now())
        .unwrap();
    clock.advance(std::time::Duration::from_secs(31));
    registry
        .get_or_create(&DeviceId::new("fresh"), clock.now())
        .unwrap();

    let threshold = chrono::Duration::seconds(30);
    assert_eq!(
        registry.available(clock.now(), threshold),
        vec![DeviceId::new("fresh")]
    );
}

#[test]
fn unknown_device_lookup_fails() {
    let registry = DeviceRegistry::new(Availability::new());
    assert!(matches!(
        registry.entry("ghost"),
        Err(StoreError::UnknownDevice(_))
    ));
    assert!(registry.get("ghost").is_none());
}

#[test]
fn unavailable_registry_refuses_new_devices() {
    let clock = FakeClock::new();
    let availability = Availability::new();
    let registry = DeviceRegistry::new(availability.clone());
    availability.mark_unavailable();

    assert!(matches!(
        registry.get_or_create(&DeviceId::new("a"), clock.now()),
        Err(StoreError::Unavailable)
    ));
}
