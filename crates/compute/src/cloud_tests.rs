// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::client;
use dr_core::{JobPayload, JobState, PropertyBag, StandardJob, TaskSpec};
use dr_engine::Simulation;
use dr_platform::{HostSpec, Platform};
use dr_wire::Commport;
use std::collections::HashMap;

fn platform() -> Platform {
    Platform::builder()
        .host("h1", HostSpec::new(1.0, 2, 1000))
        .host("h2", HostSpec::new(1.0, 4, 2000))
        .build()
}

fn start_cloud(sim: &Simulation) -> Commport {
    let ctx = sim.service_ctx("cloud1", "h1", PropertyBag::new());
    let cloud = CloudComputeService::new(ctx, vec!["h1".into(), "h2".into()]);
    sim.launch(cloud, false);
    sim.fabric().commport("manager")
}

fn one_task_job(name: &str, flops: f64) -> StandardJob {
    StandardJob::new(name, vec![TaskSpec::new("t1", flops)], HashMap::new()).unwrap()
}

fn vm_args(vm: &dr_core::VmId) -> dr_core::ServiceJobArgs {
    [("-vm".to_string(), vm.to_string())].into_iter().collect()
}

async fn next_done(manager: &mut Commport, timeout: f64) -> dr_core::SimResult<()> {
    match manager.get(Some(timeout)).await.unwrap() {
        Message::Compute(ComputeMessage::JobDone { result, .. }) => result,
        other => panic!("unexpected message {}", other.name()),
    }
}

#[tokio::test(start_paused = true)]
async fn vm_lifecycle_runs_a_job() {
    let sim = Simulation::new(platform());
    let mut manager = start_cloud(&sim);
    let clock = sim.clock().clone();

    let vm = client::create_vm(&sim, "cloud1", 1, 500, None).await.unwrap();
    let vm_service = client::start_vm(&sim, "cloud1", &vm).await.unwrap();
    assert!(sim.registry().entry(vm_service.as_str()).is_some());

    let job = one_task_job("j1", 5.0);
    client::submit_job(
        &sim,
        "cloud1",
        JobPayload::Standard(job.clone()),
        vm_args(&vm),
        manager.endpoint(),
    )
    .await
    .unwrap();

    next_done(&mut manager, 30.0).await.unwrap();
    assert!((clock.now() - 5.0).abs() < 0.05);
    assert_eq!(job.state(), JobState::Completed);
}

#[tokio::test(start_paused = true)]
async fn suspension_extends_turnaround_by_the_suspension_span() {
    let sim = Simulation::new(platform());
    let mut manager = start_cloud(&sim);
    let clock = sim.clock().clone();

    let vm = client::create_vm(&sim, "cloud1", 1, 500, Some("h1".into())).await.unwrap();
    client::start_vm(&sim, "cloud1", &vm).await.unwrap();

    let job = one_task_job("j1", 5.0);
    let submitted_at = clock.now();
    client::submit_job(
        &sim,
        "cloud1",
        JobPayload::Standard(job.clone()),
        vm_args(&vm),
        manager.endpoint(),
    )
    .await
    .unwrap();

    // Freeze the VM mid-run for 100 s.
    clock.sleep(2.5).await;
    client::suspend_vm(&sim, "cloud1", &vm).await.unwrap();
    clock.sleep(100.0).await;
    client::resume_vm(&sim, "cloud1", &vm).await.unwrap();

    next_done(&mut manager, 30.0).await.unwrap();
    let turnaround = clock.now() - submitted_at;
    assert!((turnaround - 105.0).abs() < 0.05, "turnaround was {turnaround}");
}

#[tokio::test(start_paused = true)]
async fn submit_to_a_shut_down_vm_fails() {
    let sim = Simulation::new(platform());
    let mut manager = start_cloud(&sim);

    let vm = client::create_vm(&sim, "cloud1", 1, 100, None).await.unwrap();
    client::start_vm(&sim, "cloud1", &vm).await.unwrap();
    client::shutdown_vm(&sim, "cloud1", &vm).await.unwrap();

    let err = client::submit_job(
        &sim,
        "cloud1",
        JobPayload::Standard(one_task_job("j1", 1.0)),
        vm_args(&vm),
        manager.endpoint(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.label(), "service_is_down");
}

#[tokio::test(start_paused = true)]
async fn reservations_never_exceed_host_totals() {
    let sim = Simulation::new(platform());
    let _manager = start_cloud(&sim);
    sim.clock().sleep(0.1).await;

    // h1 has 2 cores: two 1-core VMs fit, a third does not.
    client::create_vm(&sim, "cloud1", 1, 100, Some("h1".into())).await.unwrap();
    client::create_vm(&sim, "cloud1", 1, 100, Some("h1".into())).await.unwrap();
    let err =
        client::create_vm(&sim, "cloud1", 1, 100, Some("h1".into())).await.unwrap_err();
    assert_eq!(err.label(), "not_enough_resources");

    // Unpinned placement falls over to h2.
    let vm = client::create_vm(&sim, "cloud1", 4, 100, None).await.unwrap();
    client::start_vm(&sim, "cloud1", &vm).await.unwrap();
    assert!(sim.platform().host_is_on(vm.as_str()));
}

#[tokio::test(start_paused = true)]
async fn ram_reservations_are_enforced_too() {
    let sim = Simulation::new(platform());
    let _manager = start_cloud(&sim);
    sim.clock().sleep(0.1).await;

    client::create_vm(&sim, "cloud1", 1, 900, Some("h1".into())).await.unwrap();
    let err =
        client::create_vm(&sim, "cloud1", 1, 200, Some("h1".into())).await.unwrap_err();
    assert_eq!(err.label(), "not_enough_resources");
}

#[tokio::test(start_paused = true)]
async fn migration_moves_the_reservation() {
    let sim = Simulation::new(platform());
    let _manager = start_cloud(&sim);
    sim.clock().sleep(0.1).await;

    let vm = client::create_vm(&sim, "cloud1", 2, 500, Some("h1".into())).await.unwrap();
    client::start_vm(&sim, "cloud1", &vm).await.unwrap();
    client::migrate_vm(&sim, "cloud1", &vm, "h2".into()).await.unwrap();

    // h1 is free again: a 2-core VM fits there now.
    let second = client::create_vm(&sim, "cloud1", 2, 500, Some("h1".into())).await.unwrap();
    assert_ne!(second, vm);
    // The migrated VM inherits h2's backing.
    assert_eq!(sim.platform().host_speed(vm.as_str()).unwrap(), 1.0);
}

#[tokio::test(start_paused = true)]
async fn destroy_requires_shutdown_first() {
    let sim = Simulation::new(platform());
    let _manager = start_cloud(&sim);
    sim.clock().sleep(0.1).await;

    let vm = client::create_vm(&sim, "cloud1", 1, 100, None).await.unwrap();
    client::start_vm(&sim, "cloud1", &vm).await.unwrap();

    let err = client::destroy_vm(&sim, "cloud1", &vm).await.unwrap_err();
    assert_eq!(err.label(), "not_allowed");

    client::shutdown_vm(&sim, "cloud1", &vm).await.unwrap();
    client::destroy_vm(&sim, "cloud1", &vm).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn service_stop_shuts_every_vm_down() {
    let sim = Simulation::new(platform());
    let mut manager = start_cloud(&sim);

    let vm = client::create_vm(&sim, "cloud1", 1, 100, None).await.unwrap();
    let vm_service = client::start_vm(&sim, "cloud1", &vm).await.unwrap();

    // A job is running inside when the cloud stops.
    let job = one_task_job("j1", 1000.0);
    client::submit_job(
        &sim,
        "cloud1",
        JobPayload::Standard(job.clone()),
        vm_args(&vm),
        manager.endpoint(),
    )
    .await
    .unwrap();
    sim.clock().sleep(1.0).await;

    sim.stop_service("cloud1", true, dr_core::TerminationCause::ServiceTerminated)
        .await
        .unwrap();

    assert_eq!(next_done(&mut manager, 30.0).await.unwrap_err().label(), "service_is_down");
    assert_eq!(
        sim.registry().state(vm_service.as_str()),
        Some(dr_engine::ServiceState::Down)
    );
}
