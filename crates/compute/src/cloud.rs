// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cloud / virtualized cluster service.
//!
//! VMs are core/RAM reservations on physical hosts, realized when started
//! as synthetic platform hosts backing a nested bare-metal service.
//! Suspension freezes the nested service with its work preserved;
//! migration re-backs the synthetic host onto another physical host and
//! moves the reservation.

use crate::bare_metal::BareMetalComputeService;
use crate::client;
use dr_core::{
    FailureCause, HostName, JobPayload, ServiceJobArgs, ServiceName, SimResult, TerminationCause,
    VmId,
};
use dr_engine::registry::{JobSupport, ServiceKind};
use dr_engine::service::{Service, ServiceCtx};
use dr_wire::{CloudMessage, ComputeMessage, ControlMessage, Endpoint, Message};
use indexmap::IndexMap;
use std::collections::HashMap;

/// Lifecycle state of one VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmState {
    Created,
    Running,
    Suspended,
    ShutDown,
}

dr_core::simple_display! {
    VmState {
        Created => "created",
        Running => "running",
        Suspended => "suspended",
        ShutDown => "shut_down",
    }
}

struct Vm {
    host: HostName,
    cores: usize,
    ram: u64,
    state: VmState,
    service: Option<ServiceName>,
    vhost: HostName,
}

/// Manages VM placement and lifecycle over a set of physical hosts.
pub struct CloudComputeService {
    ctx: ServiceCtx,
    hosts: Vec<HostName>,
    vms: IndexMap<VmId, Vm>,
    reserved: HashMap<HostName, (usize, u64)>,
}

impl CloudComputeService {
    pub fn new(ctx: ServiceCtx, hosts: Vec<HostName>) -> Self {
        let reserved = hosts.iter().map(|h| (h.clone(), (0, 0))).collect();
        Self { ctx, hosts, vms: IndexMap::new(), reserved }
    }

    fn not_allowed(&self, reason: impl Into<String>) -> FailureCause {
        FailureCause::NotAllowed { service: self.ctx.name.clone(), reason: reason.into() }
    }

    fn room_on(&self, host: &HostName, cores: usize, ram: u64) -> bool {
        let platform = self.ctx.sim().platform();
        let total_cores = platform.host_cores(host.as_str()).unwrap_or(0);
        let total_ram = platform.host_memory(host.as_str()).unwrap_or(0);
        let (used_cores, used_ram) = self.reserved.get(host).copied().unwrap_or((0, 0));
        used_cores + cores <= total_cores && used_ram + ram <= total_ram
    }

    fn reserve(&mut self, host: &HostName, cores: usize, ram: u64) {
        if let Some((c, r)) = self.reserved.get_mut(host) {
            *c += cores;
            *r += ram;
        }
    }

    fn unreserve(&mut self, host: &HostName, cores: usize, ram: u64) {
        if let Some((c, r)) = self.reserved.get_mut(host) {
            *c = c.saturating_sub(cores);
            *r = r.saturating_sub(ram);
        }
    }

    fn handle_create_vm(
        &mut self,
        cores: usize,
        ram: u64,
        host: Option<HostName>,
    ) -> SimResult<VmId> {
        let host = match host {
            Some(host) => {
                if !self.hosts.contains(&host) {
                    return Err(self.not_allowed(format!("unknown host '{host}'")));
                }
                if !self.room_on(&host, cores, ram) {
                    return Err(FailureCause::NotEnoughResources {
                        job: format!("vm({cores} cores, {ram} B)"),
                        service: self.ctx.name.clone(),
                    });
                }
                host
            }
            None => self
                .hosts
                .iter()
                .find(|h| self.room_on(h, cores, ram))
                .cloned()
                .ok_or_else(|| FailureCause::NotEnoughResources {
                    job: format!("vm({cores} cores, {ram} B)"),
                    service: self.ctx.name.clone(),
                })?,
        };
        self.reserve(&host, cores, ram);
        let id = VmId::new();
        let vhost = HostName::new(id.as_str());
        tracing::info!(service = %self.ctx.name, vm = %id, host = %host, cores, ram, "vm created");
        self.vms.insert(
            id.clone(),
            Vm { host, cores, ram, state: VmState::Created, service: None, vhost },
        );
        Ok(id)
    }

    fn vm(&self, id: &VmId) -> SimResult<&Vm> {
        self.vms.get(id).ok_or_else(|| FailureCause::NotAllowed {
            service: self.ctx.name.clone(),
            reason: format!("unknown vm '{id}'"),
        })
    }

    async fn handle_start_vm(&mut self, id: &VmId) -> SimResult<ServiceName> {
        let vm = self.vm(id)?;
        if vm.state != VmState::Created && vm.state != VmState::ShutDown {
            return Err(self.not_allowed(format!("vm '{id}' is {}", vm.state)));
        }
        let (host, cores, ram, vhost) =
            (vm.host.clone(), vm.cores, vm.ram, vm.vhost.clone());
        let sim = self.ctx.sim().clone();
        sim.platform()
            .add_virtual_host(vhost.as_str(), host.as_str(), cores, ram)
            .map_err(|e| self.not_allowed(e.to_string()))?;
        let service_name = ServiceName::new(format!("{}_{}", self.ctx.name, id));
        let nested_ctx =
            sim.service_ctx(service_name.clone(), vhost.clone(), self.ctx.properties.clone());
        let nested = BareMetalComputeService::new(
            nested_ctx,
            vec![vhost],
            JobSupport::standard_only(),
            None,
        );
        sim.launch(nested, false);
        tracing::info!(service = %self.ctx.name, vm = %id, nested = %service_name, "vm started");
        if let Some(vm) = self.vms.get_mut(id) {
            vm.state = VmState::Running;
            vm.service = Some(service_name.clone());
        }
        Ok(service_name)
    }

    async fn handle_shutdown_vm(&mut self, id: &VmId) -> SimResult<()> {
        let vm = self.vm(id)?;
        if vm.state != VmState::Running && vm.state != VmState::Suspended {
            return Err(self.not_allowed(format!("vm '{id}' is {}", vm.state)));
        }
        let service = vm.service.clone();
        let vhost = vm.vhost.clone();
        let sim = self.ctx.sim().clone();
        if let Some(service) = service {
            if let Err(cause) =
                sim.stop_service(service.as_str(), true, TerminationCause::ServiceTerminated).await
            {
                tracing::debug!(%cause, "vm service already down");
            }
        }
        if let Err(e) = sim.platform().remove_virtual_host(vhost.as_str()) {
            tracing::debug!(%e, "virtual host already gone");
        }
        if let Some(vm) = self.vms.get_mut(id) {
            vm.state = VmState::ShutDown;
            vm.service = None;
        }
        tracing::info!(service = %self.ctx.name, vm = %id, "vm shut down");
        Ok(())
    }

    async fn handle_suspend_vm(&mut self, id: &VmId) -> SimResult<()> {
        let vm = self.vm(id)?;
        if vm.state != VmState::Running {
            return Err(self.not_allowed(format!("vm '{id}' is {}", vm.state)));
        }
        let Some(service) = vm.service.clone() else {
            return Err(self.not_allowed(format!("vm '{id}' has no service")));
        };
        self.ctx.sim().suspend_service(service.as_str()).await?;
        if let Some(vm) = self.vms.get_mut(id) {
            vm.state = VmState::Suspended;
        }
        tracing::info!(service = %self.ctx.name, vm = %id, "vm suspended");
        Ok(())
    }

    async fn handle_resume_vm(&mut self, id: &VmId) -> SimResult<()> {
        let vm = self.vm(id)?;
        if vm.state != VmState::Suspended {
            return Err(self.not_allowed(format!("vm '{id}' is {}", vm.state)));
        }
        let Some(service) = vm.service.clone() else {
            return Err(self.not_allowed(format!("vm '{id}' has no service")));
        };
        self.ctx.sim().resume_service(service.as_str()).await?;
        if let Some(vm) = self.vms.get_mut(id) {
            vm.state = VmState::Running;
        }
        tracing::info!(service = %self.ctx.name, vm = %id, "vm resumed");
        Ok(())
    }

    async fn handle_migrate_vm(&mut self, id: &VmId, dst: &HostName) -> SimResult<()> {
        let vm = self.vm(id)?;
        if !self.hosts.contains(dst) {
            return Err(self.not_allowed(format!("unknown host '{dst}'")));
        }
        if vm.host == *dst {
            return Ok(());
        }
        let (src, cores, ram, vhost, state, service) = (
            vm.host.clone(),
            vm.cores,
            vm.ram,
            vm.vhost.clone(),
            vm.state,
            vm.service.clone(),
        );
        if !self.room_on(dst, cores, ram) {
            return Err(FailureCause::NotEnoughResources {
                job: format!("vm({cores} cores, {ram} B)"),
                service: self.ctx.name.clone(),
            });
        }
        let sim = self.ctx.sim().clone();
        // Live migration: freeze, re-back the synthetic host, thaw.
        let was_running = state == VmState::Running;
        if was_running {
            if let Some(service) = &service {
                sim.suspend_service(service.as_str()).await?;
            }
        }
        if state == VmState::Running || state == VmState::Suspended {
            sim.platform()
                .rebind_virtual_host(vhost.as_str(), dst.as_str())
                .map_err(|e| self.not_allowed(e.to_string()))?;
        }
        self.unreserve(&src, cores, ram);
        self.reserve(dst, cores, ram);
        if let Some(vm) = self.vms.get_mut(id) {
            vm.host = dst.clone();
        }
        if was_running {
            if let Some(service) = &service {
                sim.resume_service(service.as_str()).await?;
            }
        }
        tracing::info!(service = %self.ctx.name, vm = %id, from = %src, to = %dst, "vm migrated");
        Ok(())
    }

    async fn handle_destroy_vm(&mut self, id: &VmId) -> SimResult<()> {
        let vm = self.vm(id)?;
        if vm.state == VmState::Running || vm.state == VmState::Suspended {
            return Err(self.not_allowed(format!("vm '{id}' is {}; shut it down first", vm.state)));
        }
        let (host, cores, ram) = (vm.host.clone(), vm.cores, vm.ram);
        self.unreserve(&host, cores, ram);
        self.vms.shift_remove(id);
        tracing::info!(service = %self.ctx.name, vm = %id, "vm destroyed");
        Ok(())
    }

    /// Route a `{-vm: id}` submission to the VM's nested service.
    async fn handle_submit(
        &mut self,
        job: JobPayload,
        args: ServiceJobArgs,
        notify: Endpoint,
    ) -> SimResult<()> {
        let Some(vm_id) = args.get("-vm") else {
            return Err(self.not_allowed("cloud submissions need a '-vm' argument"));
        };
        let vm = self.vm(&VmId::from_string(vm_id.clone()))?;
        if vm.state != VmState::Running {
            let service = vm
                .service
                .clone()
                .unwrap_or_else(|| ServiceName::new(format!("{}_{}", self.ctx.name, vm_id)));
            return Err(FailureCause::ServiceIsDown { service });
        }
        let Some(service) = vm.service.clone() else {
            return Err(self.not_allowed(format!("vm '{vm_id}' has no service")));
        };
        let mut forwarded = args.clone();
        forwarded.remove("-vm");
        client::submit_job(self.ctx.sim(), service.as_str(), job, forwarded, notify).await
    }

    async fn handle_stop(&mut self) {
        let ids: Vec<VmId> = self
            .vms
            .iter()
            .filter(|(_, vm)| vm.state == VmState::Running || vm.state == VmState::Suspended)
            .map(|(id, _)| id.clone())
            .collect();
        for id in ids {
            if let Err(cause) = self.handle_shutdown_vm(&id).await {
                tracing::debug!(vm = %id, %cause, "vm shutdown during stop failed");
            }
        }
    }

    async fn handle_message(&mut self, msg: Message) -> bool {
        match msg {
            Message::Cloud(cloud_msg) => {
                match cloud_msg {
                    CloudMessage::CreateVm { cores, ram, host, reply } => {
                        let result = self.handle_create_vm(cores, ram, host);
                        let answer = Message::Cloud(CloudMessage::CreateVmReply { result });
                        if let Err(cause) = reply.put(answer).await {
                            tracing::debug!(%cause, "requester is gone");
                        }
                    }
                    CloudMessage::StartVm { vm, reply } => {
                        let result = self.handle_start_vm(&vm).await;
                        let answer = Message::Cloud(CloudMessage::StartVmReply { result });
                        if let Err(cause) = reply.put(answer).await {
                            tracing::debug!(%cause, "requester is gone");
                        }
                    }
                    CloudMessage::ShutdownVm { vm, reply } => {
                        let result = self.handle_shutdown_vm(&vm).await;
                        let answer = Message::Cloud(CloudMessage::VmOpReply { result });
                        if let Err(cause) = reply.put(answer).await {
                            tracing::debug!(%cause, "requester is gone");
                        }
                    }
                    CloudMessage::SuspendVm { vm, reply } => {
                        let result = self.handle_suspend_vm(&vm).await;
                        let answer = Message::Cloud(CloudMessage::VmOpReply { result });
                        if let Err(cause) = reply.put(answer).await {
                            tracing::debug!(%cause, "requester is gone");
                        }
                    }
                    CloudMessage::ResumeVm { vm, reply } => {
                        let result = self.handle_resume_vm(&vm).await;
                        let answer = Message::Cloud(CloudMessage::VmOpReply { result });
                        if let Err(cause) = reply.put(answer).await {
                            tracing::debug!(%cause, "requester is gone");
                        }
                    }
                    CloudMessage::MigrateVm { vm, dst, reply } => {
                        let result = self.handle_migrate_vm(&vm, &dst).await;
                        let answer = Message::Cloud(CloudMessage::VmOpReply { result });
                        if let Err(cause) = reply.put(answer).await {
                            tracing::debug!(%cause, "requester is gone");
                        }
                    }
                    CloudMessage::DestroyVm { vm, reply } => {
                        let result = self.handle_destroy_vm(&vm).await;
                        let answer = Message::Cloud(CloudMessage::VmOpReply { result });
                        if let Err(cause) = reply.put(answer).await {
                            tracing::debug!(%cause, "requester is gone");
                        }
                    }
                    other => {
                        tracing::warn!(msg = other.name(), "unexpected cloud reply");
                    }
                }
                true
            }
            Message::Compute(ComputeMessage::SubmitJob { job, args, notify, reply }) => {
                let result = self.handle_submit(job, args, notify).await;
                let answer = Message::Compute(ComputeMessage::SubmitJobReply { result });
                if let Err(cause) = reply.put(answer).await {
                    tracing::debug!(%cause, "submitter is gone");
                }
                true
            }
            Message::Control(ControlMessage::Stop { reply, .. }) => {
                self.handle_stop().await;
                let answer =
                    Message::Control(ControlMessage::Stopped { service: self.ctx.name.clone() });
                if let Err(cause) = reply.put(answer).await {
                    tracing::debug!(%cause, "stopper is gone");
                }
                false
            }
            Message::Control(ControlMessage::HostStateChanged { .. }) => true,
            other => {
                tracing::warn!(service = %self.ctx.name, msg = other.name(), "unexpected message");
                true
            }
        }
    }
}

#[async_trait::async_trait]
impl Service for CloudComputeService {
    fn ctx(&self) -> &ServiceCtx {
        &self.ctx
    }

    fn ctx_mut(&mut self) -> &mut ServiceCtx {
        &mut self.ctx
    }

    fn kind(&self) -> ServiceKind {
        ServiceKind::Compute
    }

    fn job_support(&self) -> JobSupport {
        JobSupport::standard_only()
    }

    async fn main(&mut self) -> u8 {
        tracing::info!(
            service = %self.ctx.name,
            hosts = self.hosts.len(),
            "cloud compute service up"
        );
        loop {
            let msg = match self.ctx.commport.get(None).await {
                Ok(msg) => msg,
                Err(_) => break,
            };
            if !self.handle_message(msg).await {
                break;
            }
        }
        0
    }
}

#[cfg(test)]
#[path = "cloud_tests.rs"]
mod tests;
