// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use dr_core::ServiceName;

fn svc() -> ServiceName {
    ServiceName::new("batch1")
}

#[yare::parameterized(
    fcfs         = { "FCFS", SchedulingAlgorithm::Fcfs },
    conservative = { "conservative_bf", SchedulingAlgorithm::ConservativeBf },
    easy         = { "easy_bf", SchedulingAlgorithm::EasyBf },
)]
fn scheduling_algorithm_parses(value: &str, expected: SchedulingAlgorithm) {
    assert_eq!(SchedulingAlgorithm::parse(value, &svc()).unwrap(), expected);
}

#[test]
fn unknown_algorithms_are_rejected() {
    assert!(SchedulingAlgorithm::parse("sjf", &svc()).is_err());
    assert!(HostSelection::parse("WORSTFIT", &svc()).is_err());
}

#[test]
fn batch_args_parse_and_validate() {
    let args: dr_core::ServiceJobArgs =
        [("-N", "2"), ("-c", "4"), ("-t", "10")].iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    let parsed = BatchArgs::parse(&args, 4, 8, &svc()).unwrap();
    assert_eq!(parsed.nodes, 2);
    assert_eq!(parsed.cores_per_node, 4);
    assert_eq!(parsed.minutes, 10);
    assert_eq!(parsed.walltime_seconds(), 600.0);
}

#[yare::parameterized(
    missing_nodes = { &[("-c", "1"), ("-t", "5")] },
    zero_nodes    = { &[("-N", "0"), ("-c", "1"), ("-t", "5")] },
    bad_number    = { &[("-N", "two"), ("-c", "1"), ("-t", "5")] },
    too_many_nodes = { &[("-N", "9"), ("-c", "1"), ("-t", "5")] },
    too_many_cores = { &[("-N", "1"), ("-c", "99"), ("-t", "5")] },
)]
fn invalid_batch_args_are_rejected(pairs: &[(&str, &str)]) {
    let args: dr_core::ServiceJobArgs =
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    assert!(BatchArgs::parse(&args, 4, 8, &svc()).is_err());
}

#[test]
fn empty_timeline_starts_immediately() {
    let timeline = Timeline::new(0.0, 4);
    assert_eq!(timeline.earliest_start(2, 100.0, 0.0), 0.0);
    assert_eq!(timeline.earliest_start(4, 100.0, 0.0), 0.0);
}

#[test]
fn full_reservation_pushes_the_start_to_the_release() {
    let mut timeline = Timeline::new(0.0, 4);
    // One job holds all 4 nodes until t=300.
    timeline.reserve(0.0, 300.0, 4);
    assert_eq!(timeline.earliest_start(2, 1000.0, 0.0), 300.0);
    assert_eq!(timeline.earliest_start(1, 10.0, 0.0), 300.0);
}

#[test]
fn partial_reservation_leaves_room() {
    let mut timeline = Timeline::new(0.0, 4);
    timeline.reserve(0.0, 300.0, 3);
    assert_eq!(timeline.earliest_start(1, 1000.0, 0.0), 0.0);
    assert_eq!(timeline.earliest_start(2, 1000.0, 0.0), 300.0);
}

#[test]
fn windows_must_fit_between_reservations() {
    let mut timeline = Timeline::new(0.0, 4);
    // 2 nodes free on [0, 100), everything free afterwards, then a later
    // full reservation on [200, 300).
    timeline.reserve(0.0, 100.0, 2);
    timeline.reserve(200.0, 300.0, 4);
    // A short 3-node job fits only between the two reservations.
    assert_eq!(timeline.earliest_start(3, 50.0, 0.0), 100.0);
    // A long 3-node job has to wait for the second release.
    assert_eq!(timeline.earliest_start(3, 150.0, 0.0), 300.0);
}

#[test]
fn stacked_reservations_accumulate() {
    let mut timeline = Timeline::new(0.0, 4);
    timeline.reserve(0.0, 100.0, 2);
    timeline.reserve(0.0, 200.0, 2);
    assert_eq!(timeline.earliest_start(1, 10.0, 0.0), 100.0);
    assert_eq!(timeline.earliest_start(3, 10.0, 0.0), 200.0);
}
