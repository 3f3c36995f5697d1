// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Batch scheduling scenarios: queue wait-time prediction and walltime
//! enforcement.

use crate::support::*;
use dr_compute::{BatchComputeService, BATCH_SCHEDULING_ALGORITHM};
use dr_core::{ExecutionEvent, JobPayload, PropertyBag, ServiceJobArgs};
use dr_engine::Simulation;
use dr_platform::{HostSpec, Platform};
use dr_wire::EstimateCandidate;

fn platform_4x10() -> Platform {
    let mut builder = Platform::builder();
    for i in 1..=4 {
        builder = builder.host(format!("h{i}"), HostSpec::new(1.0, 10, 1024));
    }
    builder.build()
}

fn start_batch(sim: &Simulation, props: PropertyBag) {
    let ctx = sim.service_ctx("batch1", "h1", props);
    let hosts = (1..=4).map(|i| format!("h{i}").into()).collect();
    let batch = BatchComputeService::new(ctx, hosts).unwrap();
    sim.launch(batch, false);
}

fn batch_args(nodes: u64, cores: u64, minutes: u64) -> ServiceJobArgs {
    [
        ("-N".to_string(), nodes.to_string()),
        ("-c".to_string(), cores.to_string()),
        ("-t".to_string(), minutes.to_string()),
    ]
    .into_iter()
    .collect()
}

#[tokio::test(start_paused = true)]
async fn conservative_bf_predicts_the_queue_wait() {
    let sim = Simulation::new(platform_4x10());
    let props = PropertyBag::new().with(BATCH_SCHEDULING_ALGORITHM, "conservative_bf");
    start_batch(&sim, props);
    let mut wms = controller(&sim, "h1");
    let manager = wms.create_job_manager();

    // J1 starts immediately, holding all 4 nodes for a 5-minute walltime.
    let j1 = one_task_job("j1", 10_000.0);
    manager.submit("batch1", JobPayload::Standard(j1), batch_args(4, 1, 5)).await.unwrap();
    sim.clock().sleep(0.5).await;

    // A 2-node candidate has to wait for J1's reservation to end at 300 s.
    let estimates = dr_compute::client::start_time_estimates(
        &sim,
        "batch1",
        vec![EstimateCandidate {
            key: "candidate".into(),
            nodes: 2,
            cores_per_node: 1,
            duration: 1000.0,
        }],
    )
    .await
    .unwrap();

    assert_eq!(estimates.len(), 1);
    assert!(
        (estimates[0].date - 300.0).abs() < 1.0,
        "estimate was {}",
        estimates[0].date
    );
}

#[tokio::test(start_paused = true)]
async fn walltime_bound_is_enforced_with_padding_tolerance() {
    let sim = Simulation::new(platform_4x10());
    start_batch(&sim, PropertyBag::new());
    let mut wms = controller(&sim, "h1");
    let manager = wms.create_job_manager();
    let clock = sim.clock().clone();

    // 2 minutes requested, 1000 s of work: forced timeout at 120 s.
    let job = one_task_job("overrun", 1000.0);
    let submit_date = clock.now();
    manager.submit("batch1", JobPayload::Standard(job.clone()), batch_args(1, 1, 2)).await.unwrap();

    match wms.wait_for_next_event(Some(600.0)).await.unwrap() {
        ExecutionEvent::StandardJobFailed { job: failed, cause } => {
            assert_eq!(failed, job);
            assert_eq!(cause.label(), "job_timeout");
        }
        other => panic!("unexpected event {other}"),
    }
    let elapsed = clock.now() - submit_date;
    assert!(elapsed <= 120.0 + 1.0, "timed out after {elapsed}");
    assert!(elapsed >= 119.0, "timed out early at {elapsed}");
}
