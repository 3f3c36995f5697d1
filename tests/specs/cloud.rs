// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cloud scenarios: VM-hosted jobs and suspension accounting.

use crate::support::*;
use dr_compute::{client, CloudComputeService};
use dr_core::{ExecutionEvent, JobPayload, PropertyBag, ServiceJobArgs};
use dr_engine::Simulation;

fn start_cloud(sim: &Simulation) {
    let ctx = sim.service_ctx("cloud1", "h1", PropertyBag::new());
    let cloud = CloudComputeService::new(ctx, vec!["h1".into()]);
    sim.launch(cloud, false);
}

fn vm_args(vm: &dr_core::VmId) -> ServiceJobArgs {
    [("-vm".to_string(), vm.to_string())].into_iter().collect()
}

#[tokio::test(start_paused = true)]
async fn suspension_span_extends_the_turnaround() {
    let sim = Simulation::new(one_host_platform());
    start_cloud(&sim);
    let mut wms = controller(&sim, "h1");
    let manager = wms.create_job_manager();
    let clock = sim.clock().clone();

    // A 1-core VM on the 2-core host.
    let vm = client::create_vm(&sim, "cloud1", 1, 512, None).await.unwrap();
    client::start_vm(&sim, "cloud1", &vm).await.unwrap();

    // 5 s of work; frozen for 100 s mid-run.
    let job = one_task_job("vm_job", 5.0);
    let submitted_at = clock.now();
    manager.submit("cloud1", JobPayload::Standard(job.clone()), vm_args(&vm)).await.unwrap();

    clock.sleep(2.0).await;
    client::suspend_vm(&sim, "cloud1", &vm).await.unwrap();
    clock.sleep(100.0).await;
    client::resume_vm(&sim, "cloud1", &vm).await.unwrap();

    match wms.wait_for_next_event(Some(60.0)).await.unwrap() {
        ExecutionEvent::StandardJobCompleted { job: done } => assert_eq!(done, job),
        other => panic!("unexpected event {other}"),
    }
    let turnaround = clock.now() - submitted_at;
    assert!((turnaround - 105.0).abs() < 0.01, "turnaround was {turnaround}");
}

#[tokio::test(start_paused = true)]
async fn shut_down_vms_answer_service_is_down() {
    let sim = Simulation::new(one_host_platform());
    start_cloud(&sim);
    let mut wms = controller(&sim, "h1");
    let manager = wms.create_job_manager();

    let vm = client::create_vm(&sim, "cloud1", 1, 256, None).await.unwrap();
    client::start_vm(&sim, "cloud1", &vm).await.unwrap();
    client::shutdown_vm(&sim, "cloud1", &vm).await.unwrap();

    let job = one_task_job("late", 1.0);
    let err = manager
        .submit("cloud1", JobPayload::Standard(job), vm_args(&vm))
        .await
        .unwrap_err();
    assert_eq!(err.label(), "service_is_down");
    drop(wms);
}
