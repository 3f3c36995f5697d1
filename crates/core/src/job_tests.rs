// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::action::ActionState;
use crate::data::DataFile;

#[test]
fn compound_job_collects_actions_in_order() {
    let job = CompoundJob::new("j1");
    job.add_compute_action("a", 1.0, 1, 1, 0).unwrap();
    job.add_sleep_action("b", 2.0).unwrap();
    job.add_compute_action("c", 3.0, 1, 2, 0).unwrap();

    let names: Vec<String> = job.actions().iter().map(|a| a.name()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
    assert_eq!(job.action_count(), 3);
}

#[test]
fn duplicate_action_name_is_rejected() {
    let job = CompoundJob::new("j1");
    job.add_compute_action("a", 1.0, 1, 1, 0).unwrap();
    let err = job.add_sleep_action("a", 1.0).unwrap_err();
    assert_eq!(err, JobError::DuplicateAction("a".into()));
}

#[test]
fn actions_know_their_job() {
    let job = CompoundJob::new("j1");
    let action = job.add_compute_action("a", 1.0, 1, 1, 0).unwrap();
    assert_eq!(action.job().as_deref(), Some("j1"));
}

#[test]
fn self_dependency_is_rejected() {
    let job = CompoundJob::new("j1");
    let a = job.add_compute_action("a", 1.0, 1, 1, 0).unwrap();
    let err = job.add_dependency(&a, &a).unwrap_err();
    assert_eq!(err, JobError::SelfDependency("a".into()));
}

#[test]
fn foreign_action_is_rejected() {
    let job = CompoundJob::new("j1");
    let other = CompoundJob::new("j2");
    let a = job.add_compute_action("a", 1.0, 1, 1, 0).unwrap();
    let b = other.add_compute_action("b", 1.0, 1, 1, 0).unwrap();
    let err = job.add_dependency(&a, &b).unwrap_err();
    assert_eq!(err, JobError::ForeignAction("b".into()));
}

#[test]
fn cycle_is_rejected() {
    let job = CompoundJob::new("j1");
    let a = job.add_compute_action("a", 1.0, 1, 1, 0).unwrap();
    let b = job.add_compute_action("b", 1.0, 1, 1, 0).unwrap();
    let c = job.add_compute_action("c", 1.0, 1, 1, 0).unwrap();

    job.add_dependency(&a, &b).unwrap();
    job.add_dependency(&b, &c).unwrap();
    let err = job.add_dependency(&c, &a).unwrap_err();
    assert_eq!(err, JobError::DependencyCycle { parent: "c".into(), child: "a".into() });
}

#[test]
fn mark_ready_promotes_roots_first() {
    let job = CompoundJob::new("j1");
    let a = job.add_compute_action("a", 1.0, 1, 1, 0).unwrap();
    let b = job.add_compute_action("b", 1.0, 1, 1, 0).unwrap();
    job.add_dependency(&a, &b).unwrap();

    let ready = job.mark_ready_actions();
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0], a);
    assert_eq!(b.state(), ActionState::NotReady);

    a.set_state(ActionState::Completed);
    let ready = job.mark_ready_actions();
    assert_eq!(ready, vec![b]);
}

#[test]
fn completed_requires_every_action() {
    let job = CompoundJob::new("j1");
    let a = job.add_compute_action("a", 1.0, 1, 1, 0).unwrap();
    let b = job.add_compute_action("b", 1.0, 1, 1, 0).unwrap();

    a.set_state(ActionState::Completed);
    assert!(!job.completed());
    b.set_state(ActionState::Completed);
    assert!(job.completed());
}

#[test]
fn first_failure_reports_cause_in_insertion_order() {
    let job = CompoundJob::new("j1");
    let a = job.add_compute_action("a", 1.0, 1, 1, 0).unwrap();
    let b = job.add_compute_action("b", 1.0, 1, 1, 0).unwrap();

    b.set_state(ActionState::Failed);
    b.set_failure_cause(Some(FailureCause::JobTimeout { job: "j1".into() }));
    a.set_state(ActionState::Failed);
    a.set_failure_cause(Some(FailureCause::JobKilled { job: "j1".into() }));

    let (action, cause) = job.first_failure().unwrap();
    assert_eq!(action, a);
    assert_eq!(cause, FailureCause::JobKilled { job: "j1".into() });
}

#[test]
fn reset_unfinished_actions_keeps_completed_work() {
    let job = CompoundJob::new("j1");
    let a = job.add_compute_action("a", 1.0, 1, 1, 0).unwrap();
    let b = job.add_compute_action("b", 1.0, 1, 1, 0).unwrap();
    job.add_dependency(&a, &b).unwrap();

    a.set_state(ActionState::Completed);
    b.set_state(ActionState::Killed);
    job.reset_unfinished_actions();

    assert_eq!(a.state(), ActionState::Completed);
    assert_eq!(b.state(), ActionState::Ready);
}

#[yare::parameterized(
    not_submitted = { JobState::NotSubmitted, false },
    pending       = { JobState::Pending, false },
    running       = { JobState::Running, false },
    completed     = { JobState::Completed, true },
    failed        = { JobState::Failed, true },
    terminated    = { JobState::Terminated, true },
)]
fn job_state_terminal(state: JobState, expected: bool) {
    assert_eq!(state.is_terminal(), expected);
}

#[test]
fn standard_job_rejects_duplicate_tasks() {
    let err = StandardJob::new(
        "sj",
        vec![TaskSpec::new("t", 1.0), TaskSpec::new("t", 2.0)],
        Default::default(),
    )
    .unwrap_err();
    assert_eq!(err, JobError::DuplicateTask("t".into()));
}

#[test]
fn standard_job_tracks_placements() {
    let file = DataFile::new("in.dat", 100);
    let loc = FileLocation::new("store", "/", file.clone());
    let job = StandardJob::new(
        "sj",
        vec![TaskSpec::new("t", 10.0).input(file.clone())],
        [(file.clone(), loc.clone())].into_iter().collect(),
    )
    .unwrap();

    assert_eq!(job.placement(&file), Some(loc));
    assert_eq!(job.tasks().len(), 1);
    assert_eq!(job.state(), JobState::NotSubmitted);
}

#[test]
fn pilot_job_carries_its_body_and_granted_service() {
    let inner = StandardJob::new("inner", vec![TaskSpec::new("t", 5.0)], Default::default())
        .unwrap();
    let pilot = PilotJob::with_body("p1", JobBody::Standard(inner));

    assert_eq!(pilot.body().unwrap().name(), "inner");
    assert!(pilot.compute_service().is_none());
    pilot.set_compute_service(Some("bm_pilot_1".into()));
    assert_eq!(pilot.compute_service().unwrap(), "bm_pilot_1");
}

#[test]
fn payload_labels_and_state_passthrough() {
    let compound = CompoundJob::new("cj");
    let payload = JobPayload::Compound(compound.clone());
    assert_eq!(payload.kind_label(), "compound");
    assert_eq!(payload.name(), "cj");

    payload.set_state(JobState::Running);
    assert_eq!(compound.state(), JobState::Running);
}
