// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One host, one task: the whole stack in its simplest shape.

use crate::support::*;
use dr_core::{ExecutionEvent, JobPayload};
use dr_engine::Simulation;
use std::collections::HashMap;

#[tokio::test(start_paused = true)]
async fn one_compute_task_completes_at_flops_over_speed() {
    let sim = Simulation::new(one_host_platform());
    start_bare_metal(&sim, "bm1", &["h1"]);
    let mut wms = controller(&sim, "h1");
    let manager = wms.create_job_manager();
    let clock = sim.clock().clone();

    // 10 flops on a 1 flop/s core.
    let job = one_task_job("job_1", 10.0);
    manager.submit("bm1", JobPayload::Standard(job.clone()), HashMap::new()).await.unwrap();

    match wms.wait_for_next_event(Some(60.0)).await.unwrap() {
        ExecutionEvent::StandardJobCompleted { job: done } => assert_eq!(done, job),
        other => panic!("unexpected event {other}"),
    }
    assert!((clock.now() - 10.0).abs() < 0.01, "completed at {}", clock.now());

    // Exactly one terminal event.
    assert!(wms.wait_for_next_event(Some(60.0)).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn two_jobs_share_the_cores() {
    let sim = Simulation::new(one_host_platform());
    start_bare_metal(&sim, "bm1", &["h1"]);
    let mut wms = controller(&sim, "h1");
    let manager = wms.create_job_manager();
    let clock = sim.clock().clone();

    let fast = one_task_job("fast", 5.0);
    let slow = one_task_job("slow", 20.0);
    manager.submit("bm1", JobPayload::Standard(slow.clone()), HashMap::new()).await.unwrap();
    manager.submit("bm1", JobPayload::Standard(fast.clone()), HashMap::new()).await.unwrap();

    // Both single-core tasks run concurrently on the 2-core host.
    match wms.wait_for_next_event(Some(60.0)).await.unwrap() {
        ExecutionEvent::StandardJobCompleted { job } => {
            assert_eq!(job, fast);
            assert!((clock.now() - 5.0).abs() < 0.05);
        }
        other => panic!("unexpected event {other}"),
    }
    match wms.wait_for_next_event(Some(60.0)).await.unwrap() {
        ExecutionEvent::StandardJobCompleted { job } => {
            assert_eq!(job, slow);
            assert!((clock.now() - 20.0).abs() < 0.05);
        }
        other => panic!("unexpected event {other}"),
    }
}
