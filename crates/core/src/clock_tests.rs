// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration as StdDuration;

#[test]
fn system_clock_tracks_utc_now() {
    let before = Utc::now();
    let now = SystemClock.now();
    assert!(now >= before);
}

#[test]
fn fake_clock_starts_at_fixed_instant() {
    assert_eq!(FakeClock::new().now(), FakeClock::new().now());
}

#[test]
fn fake_clock_advance_moves_forward() {
    let clock = FakeClock::new();
    let t1 = clock.now();
    clock.advance(StdDuration::from_secs(45));
    assert_eq!(clock.now() - t1, Duration::seconds(45));
}

#[test]
fn fake_clock_clones_share_time() {
    let clock1 = FakeClock::new();
    let clock2 = clock1.clone();
    let t1 = clock1.now();
    clock2.advance(StdDuration::from_secs(30));
    assert_eq!(clock1.now() - t1, Duration::seconds(30));
}

#[test]
fn fake_clock_set_overrides_time() {
    let clock = FakeClock::new();
    let target = clock.now() - Duration::hours(1);
    clock.set(target);
    assert_eq!(clock.now(), target);
}
