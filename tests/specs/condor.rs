// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Meta-scheduler scenarios: one submission surface over a pool.

use crate::support::*;
use dr_compute::{BatchComputeService, HtcondorComputeService};
use dr_core::{ExecutionEvent, JobPayload, PropertyBag, ServiceJobArgs};
use dr_engine::Simulation;
use dr_platform::{HostSpec, Platform};
use std::collections::HashMap;

fn pool_platform() -> Platform {
    Platform::builder()
        .host("h1", HostSpec::new(1.0, 2, 1024))
        .host("h2", HostSpec::new(1.0, 4, 1024))
        .build()
}

fn start_pool(sim: &Simulation) {
    start_bare_metal(sim, "bm1", &["h1"]);
    let batch_ctx = sim.service_ctx("batch1", "h2", PropertyBag::new());
    #[allow(clippy::unwrap_used)]
    let batch = BatchComputeService::new(batch_ctx, vec!["h2".into()]).unwrap();
    sim.launch(batch, false);

    let condor_ctx = sim.service_ctx("condor1", "h1", PropertyBag::new());
    let condor = HtcondorComputeService::new(
        condor_ctx,
        vec!["bm1".into(), "batch1".into()],
        Some("batch1".into()),
        None,
    );
    sim.launch(condor, false);
}

#[tokio::test(start_paused = true)]
async fn vanilla_and_grid_jobs_complete_through_one_surface() {
    let sim = Simulation::new(pool_platform());
    start_pool(&sim);
    let mut wms = controller(&sim, "h1");
    let manager = wms.create_job_manager();

    let vanilla = one_task_job("vanilla_job", 5.0);
    manager
        .submit("condor1", JobPayload::Standard(vanilla.clone()), HashMap::new())
        .await
        .unwrap();

    let grid_args: ServiceJobArgs = [
        ("universe".to_string(), "grid".to_string()),
        ("-N".to_string(), "1".to_string()),
        ("-c".to_string(), "2".to_string()),
        ("-t".to_string(), "5".to_string()),
    ]
    .into_iter()
    .collect();
    let grid = one_task_job("grid_job", 8.0);
    manager.submit("condor1", JobPayload::Standard(grid.clone()), grid_args).await.unwrap();

    let mut completed = Vec::new();
    for _ in 0..2 {
        match wms.wait_for_next_event(Some(400.0)).await.unwrap() {
            ExecutionEvent::StandardJobCompleted { job } => completed.push(job.name()),
            other => panic!("unexpected event {other}"),
        }
    }
    completed.sort();
    assert_eq!(completed, vec!["grid_job", "vanilla_job"]);
}
