// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared scenario-test helpers.

use dr_control::Controller;
use dr_core::{PropertyBag, StandardJob, TaskSpec};
use dr_engine::{JobSupport, Simulation};
use dr_platform::{HostSpec, Platform};
use std::collections::HashMap;

/// One host, 2 cores, speed 1 flop/s.
pub fn one_host_platform() -> Platform {
    Platform::builder().host("h1", HostSpec::new(1.0, 2, 1024)).build()
}

pub fn start_bare_metal(sim: &Simulation, name: &str, hosts: &[&str]) {
    let ctx = sim.service_ctx(name, hosts[0], PropertyBag::new());
    let bm = dr_compute::BareMetalComputeService::new(
        ctx,
        hosts.iter().map(|h| (*h).into()).collect(),
        JobSupport::standard_and_pilot(),
        None,
    );
    sim.launch(bm, false);
}

pub fn controller(sim: &Simulation, host: &str) -> Controller {
    init_logging();
    Controller::new(sim, "wms", host)
}

/// Opt-in scenario logs: `RUST_LOG=dr_engine=debug cargo test`.
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn one_task_job(name: &str, flops: f64) -> StandardJob {
    let tasks = vec![TaskSpec::new("t1", flops)];
    match StandardJob::new(name, tasks, HashMap::new()) {
        Ok(job) => job,
        Err(e) => panic!("job construction failed: {e}"),
    }
}
