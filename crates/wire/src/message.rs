// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed messages carried by commports.
//!
//! One sum per subsystem protocol, gathered under [`Message`]. Every
//! message reports `payload_bytes()` for transfer accounting: control
//! traffic costs a fixed overhead, data-bearing messages add their data.
//! Request variants carry the reply [`Endpoint`] of the private port minted
//! for the exchange.

use crate::commport::Endpoint;
use dr_core::{
    Action, DataFile, ExecutionEvent, FailureCause, FileLocation, HostName, JobPayload, PilotJob,
    ServiceJobArgs, ServiceName, SimResult, TerminationCause, VmId,
};

/// Accounted size of a payload-free control message.
pub const CONTROL_MESSAGE_BYTES: u64 = 1024;

/// Any message a commport can carry.
#[derive(Debug)]
pub enum Message {
    Control(ControlMessage),
    Aes(AesMessage),
    Compute(ComputeMessage),
    Cloud(CloudMessage),
    Storage(StorageMessage),
    Event(Box<ExecutionEvent>),
}

impl Message {
    pub fn payload_bytes(&self) -> u64 {
        match self {
            Message::Storage(m) => m.payload_bytes(),
            _ => CONTROL_MESSAGE_BYTES,
        }
    }

    /// Short tag for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Message::Control(m) => m.name(),
            Message::Aes(m) => m.name(),
            Message::Compute(m) => m.name(),
            Message::Cloud(m) => m.name(),
            Message::Storage(m) => m.name(),
            Message::Event(_) => "event",
        }
    }
}

/// Service lifecycle protocol, understood by every daemon.
#[derive(Debug)]
pub enum ControlMessage {
    /// Stop gracefully: drain or cancel in-flight work per `cause`, then
    /// acknowledge with `Stopped` and go DOWN.
    Stop { notify_pending: bool, cause: TerminationCause, reply: Endpoint },
    Stopped { service: ServiceName },
    /// Freeze all work, preserving progress.
    Suspend { reply: Endpoint },
    Suspended { service: ServiceName },
    Resume { reply: Endpoint },
    Resumed { service: ServiceName },
    /// A platform host changed power state.
    HostStateChanged { host: HostName, on: bool },
}

impl ControlMessage {
    pub fn name(&self) -> &'static str {
        match self {
            ControlMessage::Stop { .. } => "control:stop",
            ControlMessage::Stopped { .. } => "control:stopped",
            ControlMessage::Suspend { .. } => "control:suspend",
            ControlMessage::Suspended { .. } => "control:suspended",
            ControlMessage::Resume { .. } => "control:resume",
            ControlMessage::Resumed { .. } => "control:resumed",
            ControlMessage::HostStateChanged { .. } => "control:host_state",
        }
    }
}

/// Optional service-specific placement for one action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSpec {
    pub host: Option<HostName>,
    pub num_cores: Option<usize>,
}

/// Per-host resource snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct HostResourceInfo {
    pub host: HostName,
    pub total_cores: usize,
    pub idle_cores: usize,
    pub total_ram: u64,
    pub ram_available: u64,
    pub speed: f64,
    pub on: bool,
}

/// Resource snapshot of an execution service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceInformation {
    pub hosts: Vec<HostResourceInfo>,
}

impl ResourceInformation {
    pub fn total_idle_cores(&self) -> usize {
        self.hosts.iter().map(|h| h.idle_cores).sum()
    }
}

/// Action execution service protocol.
#[derive(Debug)]
pub enum AesMessage {
    SubmitAction { action: Action, spec: RunSpec, reply: Endpoint },
    SubmitActionReply { result: SimResult<()> },
    TerminateAction { action: Action, cause: TerminationCause, reply: Endpoint },
    TerminateActionReply { result: SimResult<()> },
    /// AES → parent service: the action reached a terminal state.
    ActionDone { action: Action },
    /// Executor → AES: the single-use executor finished.
    ExecutorDone { action: Action },
    ResourceInfo { reply: Endpoint },
    ResourceInfoReply { info: ResourceInformation },
}

impl AesMessage {
    pub fn name(&self) -> &'static str {
        match self {
            AesMessage::SubmitAction { .. } => "aes:submit",
            AesMessage::SubmitActionReply { .. } => "aes:submit_reply",
            AesMessage::TerminateAction { .. } => "aes:terminate",
            AesMessage::TerminateActionReply { .. } => "aes:terminate_reply",
            AesMessage::ActionDone { .. } => "aes:action_done",
            AesMessage::ExecutorDone { .. } => "aes:executor_done",
            AesMessage::ResourceInfo { .. } => "aes:resource_info",
            AesMessage::ResourceInfoReply { .. } => "aes:resource_info_reply",
        }
    }
}

/// One candidate for a batch queue wait-time estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimateCandidate {
    pub key: String,
    pub nodes: usize,
    pub cores_per_node: usize,
    /// Requested duration, in seconds.
    pub duration: f64,
}

/// Earliest feasible start date for one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct StartTimeEstimate {
    pub key: String,
    pub date: f64,
}

/// Compute service protocol (bare-metal, batch, cloud front, HTCondor).
#[derive(Debug)]
pub enum ComputeMessage {
    /// Submit a job. Lifecycle notifications go to `notify` (usually a job
    /// manager); the synchronous answer goes to `reply`.
    SubmitJob { job: JobPayload, args: ServiceJobArgs, notify: Endpoint, reply: Endpoint },
    SubmitJobReply { result: SimResult<()> },
    TerminateJob { job: JobPayload, reply: Endpoint },
    TerminateJobReply { result: SimResult<()> },
    /// Terminal notification for a submitted job.
    JobDone { job: JobPayload, source: ServiceName, result: SimResult<()> },
    PilotStarted { job: PilotJob, source: ServiceName, compute_service: ServiceName },
    PilotExpired { job: PilotJob, source: ServiceName },
    StartTimeEstimates { candidates: Vec<EstimateCandidate>, reply: Endpoint },
    StartTimeEstimatesReply { result: SimResult<Vec<StartTimeEstimate>> },
}

impl ComputeMessage {
    pub fn name(&self) -> &'static str {
        match self {
            ComputeMessage::SubmitJob { .. } => "compute:submit_job",
            ComputeMessage::SubmitJobReply { .. } => "compute:submit_job_reply",
            ComputeMessage::TerminateJob { .. } => "compute:terminate_job",
            ComputeMessage::TerminateJobReply { .. } => "compute:terminate_job_reply",
            ComputeMessage::JobDone { .. } => "compute:job_done",
            ComputeMessage::PilotStarted { .. } => "compute:pilot_started",
            ComputeMessage::PilotExpired { .. } => "compute:pilot_expired",
            ComputeMessage::StartTimeEstimates { .. } => "compute:estimates",
            ComputeMessage::StartTimeEstimatesReply { .. } => "compute:estimates_reply",
        }
    }
}

/// Cloud / virtualized-cluster protocol.
#[derive(Debug)]
pub enum CloudMessage {
    CreateVm { cores: usize, ram: u64, host: Option<HostName>, reply: Endpoint },
    CreateVmReply { result: SimResult<VmId> },
    StartVm { vm: VmId, reply: Endpoint },
    StartVmReply { result: SimResult<ServiceName> },
    ShutdownVm { vm: VmId, reply: Endpoint },
    SuspendVm { vm: VmId, reply: Endpoint },
    ResumeVm { vm: VmId, reply: Endpoint },
    MigrateVm { vm: VmId, dst: HostName, reply: Endpoint },
    DestroyVm { vm: VmId, reply: Endpoint },
    /// Answer for shutdown/suspend/resume/migrate/destroy.
    VmOpReply { result: SimResult<()> },
}

impl CloudMessage {
    pub fn name(&self) -> &'static str {
        match self {
            CloudMessage::CreateVm { .. } => "cloud:create_vm",
            CloudMessage::CreateVmReply { .. } => "cloud:create_vm_reply",
            CloudMessage::StartVm { .. } => "cloud:start_vm",
            CloudMessage::StartVmReply { .. } => "cloud:start_vm_reply",
            CloudMessage::ShutdownVm { .. } => "cloud:shutdown_vm",
            CloudMessage::SuspendVm { .. } => "cloud:suspend_vm",
            CloudMessage::ResumeVm { .. } => "cloud:resume_vm",
            CloudMessage::MigrateVm { .. } => "cloud:migrate_vm",
            CloudMessage::DestroyVm { .. } => "cloud:destroy_vm",
            CloudMessage::VmOpReply { .. } => "cloud:vm_op_reply",
        }
    }
}

/// Storage service protocol, shared by simple and compound storage.
#[derive(Debug)]
pub enum StorageMessage {
    Write { location: FileLocation, reply: Endpoint },
    WriteReply { result: SimResult<()> },
    Read { location: FileLocation, num_bytes: Option<u64>, reply: Endpoint },
    /// Bytes delivered on success; the reply itself accounts them.
    ReadReply { result: SimResult<u64> },
    Copy { src: FileLocation, dst: FileLocation, reply: Endpoint },
    CopyReply { result: SimResult<()> },
    Delete { location: FileLocation, reply: Endpoint },
    DeleteReply { result: SimResult<()> },
    Lookup { file: DataFile, reply: Endpoint },
    /// Stripe list; empty when the file is unknown.
    LookupReply { locations: Vec<FileLocation> },
    FreeSpace { reply: Endpoint },
    FreeSpaceReply { bytes: u64 },
    LastWriteDate { file: DataFile, reply: Endpoint },
    LastWriteDateReply { result: SimResult<f64> },
    Load { reply: Endpoint },
    LoadReply { result: SimResult<f64> },
}

impl StorageMessage {
    pub fn payload_bytes(&self) -> u64 {
        match self {
            // A write request ships the file's bytes to the storage.
            StorageMessage::Write { location, .. } => {
                CONTROL_MESSAGE_BYTES + location.file().size()
            }
            // A read reply ships them back.
            StorageMessage::ReadReply { result: Ok(bytes) } => CONTROL_MESSAGE_BYTES + bytes,
            _ => CONTROL_MESSAGE_BYTES,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StorageMessage::Write { .. } => "storage:write",
            StorageMessage::WriteReply { .. } => "storage:write_reply",
            StorageMessage::Read { .. } => "storage:read",
            StorageMessage::ReadReply { .. } => "storage:read_reply",
            StorageMessage::Copy { .. } => "storage:copy",
            StorageMessage::CopyReply { .. } => "storage:copy_reply",
            StorageMessage::Delete { .. } => "storage:delete",
            StorageMessage::DeleteReply { .. } => "storage:delete_reply",
            StorageMessage::Lookup { .. } => "storage:lookup",
            StorageMessage::LookupReply { .. } => "storage:lookup_reply",
            StorageMessage::FreeSpace { .. } => "storage:free_space",
            StorageMessage::FreeSpaceReply { .. } => "storage:free_space_reply",
            StorageMessage::LastWriteDate { .. } => "storage:last_write_date",
            StorageMessage::LastWriteDateReply { .. } => "storage:last_write_date_reply",
            StorageMessage::Load { .. } => "storage:load",
            StorageMessage::LoadReply { .. } => "storage:load_reply",
        }
    }
}

/// Reply-port pattern: send a request built around a private endpoint and
/// await the answer on it.
pub async fn request(
    fabric: &crate::fabric::Fabric,
    to: &Endpoint,
    timeout: Option<f64>,
    build: impl FnOnce(Endpoint) -> Message,
) -> SimResult<Message> {
    let mut port = fabric.temporary();
    to.put(build(port.endpoint())).await?;
    port.get(timeout).await
}

/// [`request`] with bounded retries on `NetworkTimeout`. Any other
/// failure, and the last timeout, surface to the caller.
pub async fn request_with_retries(
    fabric: &crate::fabric::Fabric,
    to: &Endpoint,
    timeout: f64,
    attempts: usize,
    build: impl Fn(Endpoint) -> Message,
) -> SimResult<Message> {
    let attempts = attempts.max(1);
    let mut last = FailureCause::NetworkTimeout { endpoint: to.name().to_string() };
    for attempt in 1..=attempts {
        match request(fabric, to, Some(timeout), &build).await {
            Err(FailureCause::NetworkTimeout { endpoint }) => {
                tracing::debug!(endpoint = %endpoint, attempt, "request timed out");
                last = FailureCause::NetworkTimeout { endpoint };
            }
            other => return other,
        }
    }
    Err(last)
}

/// Unexpected reply shape for an RPC; treated as a network-level protocol
/// error on the named endpoint.
pub fn protocol_error(endpoint: &str) -> FailureCause {
    FailureCause::NetworkError { endpoint: endpoint.to_string() }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
