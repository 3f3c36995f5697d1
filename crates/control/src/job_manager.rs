// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The job manager.
//!
//! A small daemon standing between compute services and a controller: it
//! receives raw job notifications, translates them into execution events,
//! and guarantees exactly one terminal event per submitted job. The
//! client half tracks which service hosts each job so terminations route
//! without the caller knowing the topology.

use dr_core::{
    ExecutionEvent, FailureCause, JobPayload, ServiceJobArgs, ServiceName, SimResult,
};
use dr_engine::registry::ServiceKind;
use dr_engine::service::{Service, ServiceCtx};
use dr_engine::Simulation;
use dr_wire::{ComputeMessage, ControlMessage, Endpoint, Message};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Daemon half: event translation and terminal-event dedup.
pub(crate) struct JobManagerDaemon {
    ctx: ServiceCtx,
    controller: Endpoint,
    terminal: HashSet<String>,
}

impl JobManagerDaemon {
    pub(crate) fn new(ctx: ServiceCtx, controller: Endpoint) -> Self {
        Self { ctx, controller, terminal: HashSet::new() }
    }

    async fn emit(&self, event: ExecutionEvent) {
        if let Err(cause) = self.controller.put(Message::Event(Box::new(event))).await {
            tracing::debug!(%cause, "controller is gone");
        }
    }

    /// One terminal event per job: later notifications for the same job
    /// are dropped.
    fn claim_terminal(&mut self, job: &str) -> bool {
        if self.terminal.contains(job) {
            tracing::warn!(job, "duplicate terminal notification dropped");
            return false;
        }
        self.terminal.insert(job.to_string());
        true
    }

    async fn handle_message(&mut self, msg: Message) -> bool {
        match msg {
            Message::Compute(ComputeMessage::JobDone { job, result, source }) => {
                let name = job.name();
                if !self.claim_terminal(&name) {
                    return true;
                }
                tracing::info!(job = %name, source = %source, ok = result.is_ok(), "job done");
                let event = match (job, result) {
                    (JobPayload::Standard(job), Ok(())) => {
                        ExecutionEvent::StandardJobCompleted { job }
                    }
                    (JobPayload::Standard(job), Err(cause)) => {
                        ExecutionEvent::StandardJobFailed { job, cause }
                    }
                    (JobPayload::Compound(job), Ok(())) => {
                        ExecutionEvent::CompoundJobCompleted { job }
                    }
                    (JobPayload::Compound(job), Err(cause)) => {
                        ExecutionEvent::CompoundJobFailed { job, cause }
                    }
                    (JobPayload::Pilot(_), _) => {
                        tracing::warn!(job = %name, "pilot jobs resolve via expiry events");
                        return true;
                    }
                };
                self.emit(event).await;
                true
            }
            Message::Compute(ComputeMessage::PilotStarted { job, compute_service, .. }) => {
                self.emit(ExecutionEvent::PilotJobStarted { job, compute_service }).await;
                true
            }
            Message::Compute(ComputeMessage::PilotExpired { job, .. }) => {
                if self.claim_terminal(&job.name()) {
                    self.emit(ExecutionEvent::PilotJobExpired { job }).await;
                }
                true
            }
            Message::Control(ControlMessage::Stop { reply, .. }) => {
                let answer =
                    Message::Control(ControlMessage::Stopped { service: self.ctx.name.clone() });
                if let Err(cause) = reply.put(answer).await {
                    tracing::debug!(%cause, "stopper is gone");
                }
                false
            }
            other => {
                tracing::warn!(service = %self.ctx.name, msg = other.name(), "unexpected message");
                true
            }
        }
    }
}

#[async_trait::async_trait]
impl Service for JobManagerDaemon {
    fn ctx(&self) -> &ServiceCtx {
        &self.ctx
    }

    fn ctx_mut(&mut self) -> &mut ServiceCtx {
        &mut self.ctx
    }

    fn kind(&self) -> ServiceKind {
        ServiceKind::Helper
    }

    async fn main(&mut self) -> u8 {
        self.terminal.clear();
        tracing::info!(service = %self.ctx.name, "job manager up");
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

/// Client half: submit and terminate jobs through the manager.
#[derive(Clone)]
pub struct JobManager {
    sim: Simulation,
    name: ServiceName,
    endpoint: Endpoint,
    routes: Arc<Mutex<HashMap<String, ServiceName>>>,
}

impl JobManager {
    pub(crate) fn new(sim: Simulation, name: ServiceName, endpoint: Endpoint) -> Self {
        Self { sim, name, endpoint, routes: Arc::new(Mutex::new(HashMap::new())) }
    }

    pub fn name(&self) -> &ServiceName {
        &self.name
    }

    /// The endpoint compute services notify.
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint.clone()
    }

    /// Submit a job to a compute service; lifecycle events will reach the
    /// owning controller through this manager.
    pub async fn submit(
        &self,
        service: &str,
        job: JobPayload,
        args: ServiceJobArgs,
    ) -> SimResult<()> {
        let name = job.name();
        dr_compute::client::submit_job(&self.sim, service, job, args, self.endpoint.clone())
            .await?;
        self.routes.lock().insert(name, ServiceName::new(service));
        Ok(())
    }

    /// Terminate a previously submitted job on its hosting service.
    pub async fn terminate(&self, job: JobPayload) -> SimResult<()> {
        let name = job.name();
        let service = self.routes.lock().get(&name).cloned();
        let service = service.ok_or_else(|| FailureCause::JobCannotBeTerminated {
            job: name,
        })?;
        dr_compute::client::terminate_job(&self.sim, service.as_str(), job).await
    }
}

#[cfg(test)]
#[path = "job_manager_tests.rs"]
mod tests;
