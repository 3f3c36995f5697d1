// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dr-compute: the compute services of the dryrun kernel — bare-metal,
//! batch, cloud/virtualized, and the HTCondor-style meta-scheduler.

pub mod bare_metal;
pub mod batch;
pub mod client;
pub mod cloud;
pub mod htcondor;
pub mod schedule;

pub use bare_metal::BareMetalComputeService;
pub use batch::{
    BatchComputeService, BATCH_RJMS_PADDING_DELAY, BATCH_SCHEDULING_ALGORITHM,
    HOST_SELECTION_ALGORITHM,
};
pub use cloud::{CloudComputeService, VmState};
pub use htcondor::{
    HtcondorComputeService, SUPPORTS_GRID_UNIVERSE, SUPPORTS_PILOT_JOBS, SUPPORTS_STANDARD_JOBS,
};
pub use schedule::{BatchArgs, HostSelection, SchedulingAlgorithm, Timeline};
