// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pilot-job scenarios: reservations, cascade failure, action reset.

use crate::support::*;
use dr_core::{ActionState, ExecutionEvent, JobBody, JobPayload, JobState, PilotJob};
use dr_engine::Simulation;
use std::collections::HashMap;

#[tokio::test(start_paused = true)]
async fn terminated_pilot_fails_its_inner_job_with_service_is_down() {
    let sim = Simulation::new(one_host_platform());
    start_bare_metal(&sim, "bm1", &["h1"]);
    let mut wms = controller(&sim, "h1");
    let manager = wms.create_job_manager();

    let inner = one_task_job("inner", 1000.0);
    let pilot = PilotJob::with_body("p1", JobBody::Standard(inner.clone()));
    manager.submit("bm1", JobPayload::Pilot(pilot.clone()), HashMap::new()).await.unwrap();

    // The reservation is granted and announced.
    match wms.wait_for_next_event(Some(30.0)).await.unwrap() {
        ExecutionEvent::PilotJobStarted { job, compute_service } => {
            assert_eq!(job, pilot);
            assert_eq!(pilot.compute_service().as_ref(), Some(&compute_service));
        }
        other => panic!("unexpected event {other}"),
    }

    // Let the inner job start, then pull the pilot out from under it.
    sim.clock().sleep(5.0).await;
    assert_eq!(inner.state(), JobState::Running);
    manager.terminate(JobPayload::Pilot(pilot.clone())).await.unwrap();

    match wms.wait_for_next_event(Some(30.0)).await.unwrap() {
        ExecutionEvent::StandardJobFailed { job, cause } => {
            assert_eq!(job, inner);
            assert_eq!(cause.label(), "service_is_down");
        }
        other => panic!("unexpected event {other}"),
    }

    // The inner task is ready again and no resources leaked: the same
    // work completes when resubmitted.
    let action = inner.compound().action("t1").unwrap();
    assert_eq!(action.state(), ActionState::Ready);

    let retry = one_task_job("retry", 10.0);
    manager.submit("bm1", JobPayload::Standard(retry.clone()), HashMap::new()).await.unwrap();
    match wms.wait_for_next_event(Some(60.0)).await.unwrap() {
        ExecutionEvent::StandardJobCompleted { job } => assert_eq!(job, retry),
        other => panic!("unexpected event {other}"),
    }
}
