// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::data::DataFile;

fn compute(name: &str, flops: f64) -> Action {
    Action::new(name, ActionKind::Compute { flops }, 1, 1, 0).unwrap()
}

#[test]
fn new_action_starts_not_ready() {
    let action = compute("t1", 100.0);
    assert_eq!(action.state(), ActionState::NotReady);
    assert!(action.start_date().is_none());
    assert!(action.failure_cause().is_none());
}

#[test]
fn invalid_core_range_is_rejected() {
    let err = Action::new("t", ActionKind::Compute { flops: 1.0 }, 0, 4, 0).unwrap_err();
    assert!(matches!(err, JobError::InvalidCoreRange { min: 0, max: 4, .. }));

    let err = Action::new("t", ActionKind::Compute { flops: 1.0 }, 3, 2, 0).unwrap_err();
    assert!(matches!(err, JobError::InvalidCoreRange { min: 3, max: 2, .. }));
}

#[test]
fn handles_compare_by_identity() {
    let a = compute("same", 1.0);
    let b = compute("same", 1.0);
    assert_ne!(a, b);
    assert_eq!(a, a.clone());
}

#[test]
fn clones_share_state() {
    let a = compute("t1", 1.0);
    let b = a.clone();
    a.set_state(ActionState::Ready);
    assert_eq!(b.state(), ActionState::Ready);
}

#[yare::parameterized(
    not_ready = { ActionState::NotReady, false },
    ready     = { ActionState::Ready, false },
    started   = { ActionState::Started, false },
    completed = { ActionState::Completed, true },
    killed    = { ActionState::Killed, true },
    failed    = { ActionState::Failed, true },
)]
fn terminal_iff_completed_killed_failed(state: ActionState, expected: bool) {
    assert_eq!(state.is_terminal(), expected);
}

#[test]
fn ready_to_run_requires_completed_parents() {
    let parent = compute("p", 1.0);
    let child = compute("c", 1.0);
    child.add_parent(parent.clone());

    assert!(!child.ready_to_run());
    parent.set_state(ActionState::Completed);
    assert!(child.ready_to_run());
}

#[test]
fn ready_to_run_is_false_once_started() {
    let action = compute("t", 1.0);
    assert!(action.ready_to_run());
    action.set_state(ActionState::Started);
    assert!(!action.ready_to_run());
}

#[test]
fn remaining_flops_tracks_progress() {
    let action = compute("t", 100.0);
    assert_eq!(action.remaining_flops(), 100.0);
    action.set_flops_done(30.0);
    assert_eq!(action.remaining_flops(), 70.0);
    action.set_flops_done(200.0);
    assert_eq!(action.remaining_flops(), 0.0);
}

#[test]
fn remaining_flops_is_zero_for_non_compute() {
    let action = Action::new("s", ActionKind::Sleep { seconds: 5.0 }, 1, 1, 0).unwrap();
    assert_eq!(action.remaining_flops(), 0.0);
}

#[test]
fn reset_for_rerun_clears_failure_and_recomputes_readiness() {
    let parent = compute("p", 1.0);
    let child = compute("c", 1.0);
    child.add_parent(parent.clone());

    child.set_state(ActionState::Killed);
    child.set_failure_cause(Some(crate::FailureCause::JobKilled { job: "j".into() }));
    child.set_end_date(4.0);

    child.reset_for_rerun();
    assert_eq!(child.state(), ActionState::NotReady);
    assert!(child.failure_cause().is_none());
    assert!(child.end_date().is_none());

    parent.set_state(ActionState::Completed);
    child.set_state(ActionState::Killed);
    child.reset_for_rerun();
    assert_eq!(child.state(), ActionState::Ready);
}

#[test]
fn kind_labels() {
    let file = DataFile::new("f", 1);
    let loc = crate::FileLocation::new("s", "/", file);
    let kinds = [
        (ActionKind::Compute { flops: 1.0 }, "compute"),
        (ActionKind::FileRead { location: loc.clone(), num_bytes: None }, "file_read"),
        (ActionKind::FileWrite { location: loc.clone() }, "file_write"),
        (ActionKind::FileDelete { location: loc }, "file_delete"),
        (ActionKind::Sleep { seconds: 1.0 }, "sleep"),
    ];
    for (kind, expected) in kinds {
        assert_eq!(kind.label(), expected);
    }
}
