// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request/reply clients for the compute protocol.

use dr_core::{JobPayload, ServiceJobArgs, SimResult, VmId};
use dr_engine::Simulation;
use dr_wire::{
    protocol_error, request, AesMessage, CloudMessage, ComputeMessage, Endpoint,
    EstimateCandidate, Message, ResourceInformation, StartTimeEstimate, DEFAULT_RPC_TIMEOUT,
};

/// Submit a job to a compute service. Lifecycle events go to `notify`.
pub async fn submit_job(
    sim: &Simulation,
    service: &str,
    job: JobPayload,
    args: ServiceJobArgs,
    notify: Endpoint,
) -> SimResult<()> {
    let endpoint = sim.registry().assert_up(service)?;
    let reply = request(sim.fabric(), &endpoint, Some(DEFAULT_RPC_TIMEOUT), |reply| {
        Message::Compute(ComputeMessage::SubmitJob { job, args, notify, reply })
    })
    .await?;
    match reply {
        Message::Compute(ComputeMessage::SubmitJobReply { result }) => result,
        _ => Err(protocol_error(service)),
    }
}

/// Terminate a job on its hosting service. Idempotence contract: a second
/// call yields a typed failure, never a crash.
pub async fn terminate_job(sim: &Simulation, service: &str, job: JobPayload) -> SimResult<()> {
    let endpoint = sim.registry().assert_up(service)?;
    let reply = request(sim.fabric(), &endpoint, Some(DEFAULT_RPC_TIMEOUT), |reply| {
        Message::Compute(ComputeMessage::TerminateJob { job, reply })
    })
    .await?;
    match reply {
        Message::Compute(ComputeMessage::TerminateJobReply { result }) => result,
        _ => Err(protocol_error(service)),
    }
}

/// Queue wait-time estimates; only batch services running
/// `conservative_bf` answer.
pub async fn start_time_estimates(
    sim: &Simulation,
    service: &str,
    candidates: Vec<EstimateCandidate>,
) -> SimResult<Vec<StartTimeEstimate>> {
    let endpoint = sim.registry().assert_up(service)?;
    let reply = request(sim.fabric(), &endpoint, Some(DEFAULT_RPC_TIMEOUT), |reply| {
        Message::Compute(ComputeMessage::StartTimeEstimates { candidates, reply })
    })
    .await?;
    match reply {
        Message::Compute(ComputeMessage::StartTimeEstimatesReply { result }) => result,
        _ => Err(protocol_error(service)),
    }
}

/// Per-host resource snapshot of a compute service.
pub async fn resource_information(
    sim: &Simulation,
    service: &str,
) -> SimResult<ResourceInformation> {
    let endpoint = sim.registry().assert_up(service)?;
    let reply = request(sim.fabric(), &endpoint, Some(DEFAULT_RPC_TIMEOUT), |reply| {
        Message::Aes(AesMessage::ResourceInfo { reply })
    })
    .await?;
    match reply {
        Message::Aes(AesMessage::ResourceInfoReply { info }) => Ok(info),
        _ => Err(protocol_error(service)),
    }
}

/// Create a VM reservation on a cloud service.
pub async fn create_vm(
    sim: &Simulation,
    cloud: &str,
    cores: usize,
    ram: u64,
    host: Option<dr_core::HostName>,
) -> SimResult<VmId> {
    let endpoint = sim.registry().assert_up(cloud)?;
    let reply = request(sim.fabric(), &endpoint, Some(DEFAULT_RPC_TIMEOUT), |reply| {
        Message::Cloud(CloudMessage::CreateVm { cores, ram, host, reply })
    })
    .await?;
    match reply {
        Message::Cloud(CloudMessage::CreateVmReply { result }) => result,
        _ => Err(protocol_error(cloud)),
    }
}

/// Start a VM; returns the name of its nested compute service.
pub async fn start_vm(sim: &Simulation, cloud: &str, vm: &VmId) -> SimResult<dr_core::ServiceName> {
    let endpoint = sim.registry().assert_up(cloud)?;
    let reply = request(sim.fabric(), &endpoint, Some(DEFAULT_RPC_TIMEOUT), |reply| {
        Message::Cloud(CloudMessage::StartVm { vm: vm.clone(), reply })
    })
    .await?;
    match reply {
        Message::Cloud(CloudMessage::StartVmReply { result }) => result,
        _ => Err(protocol_error(cloud)),
    }
}

async fn vm_op(
    sim: &Simulation,
    cloud: &str,
    build: impl FnOnce(Endpoint) -> CloudMessage,
) -> SimResult<()> {
    let endpoint = sim.registry().assert_up(cloud)?;
    let reply = request(sim.fabric(), &endpoint, Some(DEFAULT_RPC_TIMEOUT), |reply| {
        Message::Cloud(build(reply))
    })
    .await?;
    match reply {
        Message::Cloud(CloudMessage::VmOpReply { result }) => result,
        _ => Err(protocol_error(cloud)),
    }
}

pub async fn shutdown_vm(sim: &Simulation, cloud: &str, vm: &VmId) -> SimResult<()> {
    let vm = vm.clone();
    vm_op(sim, cloud, move |reply| CloudMessage::ShutdownVm { vm, reply }).await
}

pub async fn suspend_vm(sim: &Simulation, cloud: &str, vm: &VmId) -> SimResult<()> {
    let vm = vm.clone();
    vm_op(sim, cloud, move |reply| CloudMessage::SuspendVm { vm, reply }).await
}

pub async fn resume_vm(sim: &Simulation, cloud: &str, vm: &VmId) -> SimResult<()> {
    let vm = vm.clone();
    vm_op(sim, cloud, move |reply| CloudMessage::ResumeVm { vm, reply }).await
}

pub async fn migrate_vm(
    sim: &Simulation,
    cloud: &str,
    vm: &VmId,
    dst: dr_core::HostName,
) -> SimResult<()> {
    let vm = vm.clone();
    vm_op(sim, cloud, move |reply| CloudMessage::MigrateVm { vm, dst, reply }).await
}

pub async fn destroy_vm(sim: &Simulation, cloud: &str, vm: &VmId) -> SimResult<()> {
    let vm = vm.clone();
    vm_op(sim, cloud, move |reply| CloudMessage::DestroyVm { vm, reply }).await
}
