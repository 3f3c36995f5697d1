// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTCondor-style meta-scheduler.
//!
//! Routes jobs to a pool of child compute services by universe and job
//! kind: `grid` jobs go to the designated batch child, standard jobs to a
//! child advertising standard support, pilot jobs to a pilot-capable
//! child. Child notifications are re-emitted with the meta-scheduler as
//! the source, so submitters see a single service.

use crate::client;
use dr_core::{FailureCause, JobPayload, ServiceJobArgs, ServiceName, SimResult};
use dr_engine::registry::{JobSupport, ServiceKind};
use dr_engine::service::{Service, ServiceCtx};
use dr_wire::{ComputeMessage, ControlMessage, Endpoint, Message};
use std::collections::HashMap;

pub const SUPPORTS_PILOT_JOBS: &str = "SUPPORTS_PILOT_JOBS";
pub const SUPPORTS_STANDARD_JOBS: &str = "SUPPORTS_STANDARD_JOBS";
pub const SUPPORTS_GRID_UNIVERSE: &str = "SUPPORTS_GRID_UNIVERSE";

struct RoutedJob {
    child: ServiceName,
    notify: Endpoint,
}

/// Routes jobs to child compute services; at most one child is the batch
/// service backing the grid universe.
pub struct HtcondorComputeService {
    ctx: ServiceCtx,
    children: Vec<ServiceName>,
    batch_child: Option<ServiceName>,
    local_storage: Option<ServiceName>,
    routed: HashMap<String, RoutedJob>,
}

impl HtcondorComputeService {
    pub fn new(
        ctx: ServiceCtx,
        children: Vec<ServiceName>,
        batch_child: Option<ServiceName>,
        local_storage: Option<ServiceName>,
    ) -> Self {
        Self { ctx, children, batch_child, local_storage, routed: HashMap::new() }
    }

    fn prop(&self, key: &str, default: bool) -> bool {
        self.ctx.properties.get_bool(key, default).unwrap_or(default)
    }

    fn not_allowed(&self, reason: impl Into<String>) -> FailureCause {
        FailureCause::NotAllowed { service: self.ctx.name.clone(), reason: reason.into() }
    }

    /// First non-batch child whose registry flags accept the predicate.
    fn find_child(&self, accepts: impl Fn(JobSupport) -> bool) -> Option<ServiceName> {
        let registry = self.ctx.sim().registry();
        self.children
            .iter()
            .filter(|c| Some(*c) != self.batch_child.as_ref())
            .find(|c| registry.entry(c.as_str()).map(|e| accepts(e.support)).unwrap_or(false))
            .cloned()
    }

    fn route(&self, job: &JobPayload, args: &ServiceJobArgs) -> SimResult<ServiceName> {
        let universe = args.get("universe").map(String::as_str).unwrap_or("vanilla");
        if universe == "grid" {
            if !self.prop(SUPPORTS_GRID_UNIVERSE, true) {
                return Err(self.not_allowed("grid universe is disabled"));
            }
            return self
                .batch_child
                .clone()
                .ok_or_else(|| self.not_allowed("no batch service backs the grid universe"));
        }
        match job {
            JobPayload::Standard(_) | JobPayload::Compound(_) => {
                if !self.prop(SUPPORTS_STANDARD_JOBS, true) {
                    return Err(FailureCause::JobTypeNotSupported {
                        job: job.name(),
                        service: self.ctx.name.clone(),
                    });
                }
                self.find_child(|s| s.standard).ok_or_else(|| FailureCause::JobTypeNotSupported {
                    job: job.name(),
                    service: self.ctx.name.clone(),
                })
            }
            JobPayload::Pilot(_) => {
                if !self.prop(SUPPORTS_PILOT_JOBS, false) {
                    return Err(FailureCause::JobTypeNotSupported {
                        job: job.name(),
                        service: self.ctx.name.clone(),
                    });
                }
                self.find_child(|s| s.pilot).ok_or_else(|| FailureCause::JobTypeNotSupported {
                    job: job.name(),
                    service: self.ctx.name.clone(),
                })
            }
        }
    }

    async fn handle_submit(
        &mut self,
        job: JobPayload,
        args: ServiceJobArgs,
        notify: Endpoint,
    ) -> SimResult<()> {
        let child = self.route(&job, &args)?;
        let mut forwarded = args;
        forwarded.remove("universe");
        let name = job.name();
        // The child notifies us; we re-emit with ourselves as the source.
        client::submit_job(
            self.ctx.sim(),
            child.as_str(),
            job,
            forwarded,
            self.ctx.endpoint(),
        )
        .await?;
        tracing::info!(service = %self.ctx.name, job = %name, child = %child, "job routed");
        self.routed.insert(name, RoutedJob { child, notify });
        Ok(())
    }

    async fn forward(&mut self, job_name: &str, remove: bool, msg: Message) {
        let entry = if remove { self.routed.remove(job_name) } else { None };
        let notify = match entry {
            Some(routed) => Some(routed.notify),
            None => self.routed.get(job_name).map(|r| r.notify.clone()),
        };
        let Some(notify) = notify else {
            tracing::debug!(job = job_name, "notification for an unrouted job");
            return;
        };
        if let Err(cause) = notify.put(msg).await {
            tracing::debug!(%cause, "submitter is gone");
        }
    }

    async fn handle_message(&mut self, msg: Message) -> bool {
        match msg {
            Message::Compute(ComputeMessage::SubmitJob { job, args, notify, reply }) => {
                let result = self.handle_submit(job, args, notify).await;
                let answer = Message::Compute(ComputeMessage::SubmitJobReply { result });
                if let Err(cause) = reply.put(answer).await {
                    tracing::debug!(%cause, "submitter is gone");
                }
                true
            }
            Message::Compute(ComputeMessage::TerminateJob { job, reply }) => {
                let result = match self.routed.get(&job.name()) {
                    Some(routed) => {
                        client::terminate_job(self.ctx.sim(), routed.child.as_str(), job).await
                    }
                    None => Err(FailureCause::JobCannotBeTerminated { job: job.name() }),
                };
                let answer = Message::Compute(ComputeMessage::TerminateJobReply { result });
                if let Err(cause) = reply.put(answer).await {
                    tracing::debug!(%cause, "terminator is gone");
                }
                true
            }
            Message::Compute(ComputeMessage::JobDone { job, result, .. }) => {
                let name = job.name();
                let done = Message::Compute(ComputeMessage::JobDone {
                    job,
                    source: self.ctx.name.clone(),
                    result,
                });
                self.forward(&name, true, done).await;
                true
            }
            Message::Compute(ComputeMessage::PilotStarted { job, compute_service, .. }) => {
                let name = job.name();
                let started = Message::Compute(ComputeMessage::PilotStarted {
                    job,
                    source: self.ctx.name.clone(),
                    compute_service,
                });
                self.forward(&name, false, started).await;
                true
            }
            Message::Compute(ComputeMessage::PilotExpired { job, .. }) => {
                let name = job.name();
                let expired = Message::Compute(ComputeMessage::PilotExpired {
                    job,
                    source: self.ctx.name.clone(),
                });
                self.forward(&name, true, expired).await;
                true
            }
            Message::Control(ControlMessage::Stop { reply, .. }) => {
                // The children are owned by whoever created them; the
                // meta-scheduler only takes itself down.
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
impl Service for HtcondorComputeService {
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
        JobSupport {
            standard: self.prop(SUPPORTS_STANDARD_JOBS, true),
            pilot: self.prop(SUPPORTS_PILOT_JOBS, false),
            grid: self.prop(SUPPORTS_GRID_UNIVERSE, true) && self.batch_child.is_some(),
        }
    }

    fn scratch(&self) -> Option<ServiceName> {
        self.local_storage.clone()
    }

    async fn main(&mut self) -> u8 {
        tracing::info!(
            service = %self.ctx.name,
            children = self.children.len(),
            batch = self.batch_child.is_some(),
            "htcondor service up"
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
#[path = "htcondor_tests.rs"]
mod tests;
