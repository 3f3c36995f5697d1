// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bare-metal compute service.
//!
//! A thin wrapper over a private Action Execution Service: it validates
//! submissions, decomposes standard jobs into staging / read / compute /
//! write / cleanup actions with the right dependency edges, feeds ready
//! actions to the AES, and reports one terminal notification per job.
//! Pilot jobs (behind a support flag) get a nested bare-metal service on
//! the same hosts for the length of their reservation.

use crate::client;
use dr_core::{
    Action, ActionState, CompoundJob, FailureCause, FileLocation, HostName, JobPayload, JobState,
    PilotJob, ServiceJobArgs, ServiceName, SimResult, StandardJob, TerminationCause,
};
use dr_engine::aes::{self, ActionExecutionService};
use dr_engine::registry::{JobSupport, ServiceKind, ServiceState};
use dr_engine::service::{Service, ServiceCtx};
use dr_wire::{AesMessage, ComputeMessage, ControlMessage, Endpoint, Message, RunSpec};
use indexmap::IndexMap;
use std::collections::HashMap;

struct HostedJob {
    payload: JobPayload,
    compound: CompoundJob,
    run_specs: HashMap<String, RunSpec>,
    notify: Endpoint,
    done_sent: bool,
}

struct PilotRun {
    pilot: PilotJob,
    service: ServiceName,
    notify: Endpoint,
    expires: Option<f64>,
}

/// Compute service executing jobs directly on a set of hosts.
pub struct BareMetalComputeService {
    ctx: ServiceCtx,
    hosts: Vec<HostName>,
    core_cap: Option<usize>,
    support: JobSupport,
    scratch: Option<ServiceName>,
    aes_name: ServiceName,
    aes: Option<Endpoint>,
    jobs: HashMap<String, HostedJob>,
    pilots: HashMap<String, PilotRun>,
    pilot_seq: usize,
}

impl BareMetalComputeService {
    pub fn new(
        ctx: ServiceCtx,
        hosts: Vec<HostName>,
        support: JobSupport,
        scratch: Option<ServiceName>,
    ) -> Self {
        let aes_name = ServiceName::new(format!("{}_aes", ctx.name));
        Self {
            ctx,
            hosts,
            core_cap: None,
            support,
            scratch,
            aes_name,
            aes: None,
            jobs: HashMap::new(),
            pilots: HashMap::new(),
            pilot_seq: 0,
        }
    }

    /// Cap the cores used per host below the platform totals (batch
    /// allocations run with `-c` cores per node).
    pub fn with_core_cap(mut self, cap: usize) -> Self {
        self.core_cap = Some(cap);
        self
    }

    fn not_allowed(&self, reason: impl Into<String>) -> FailureCause {
        FailureCause::NotAllowed { service: self.ctx.name.clone(), reason: reason.into() }
    }

    fn aes_endpoint(&self) -> SimResult<Endpoint> {
        self.aes.clone().ok_or_else(|| FailureCause::ServiceIsDown {
            service: self.ctx.name.clone(),
        })
    }

    fn launch_aes(&mut self) {
        let sim = self.ctx.sim().clone();
        let mut resources = ActionExecutionService::resources_from_platform(&sim, &self.hosts);
        if let Some(cap) = self.core_cap {
            for (_, (cores, _)) in resources.iter_mut() {
                *cores = (*cores).min(cap);
            }
        }
        let aes_ctx =
            sim.service_ctx(self.aes_name.clone(), self.ctx.host.clone(), self.ctx.properties.clone());
        let aes = ActionExecutionService::new(aes_ctx, self.ctx.endpoint(), resources);
        self.aes = Some(sim.launch(aes, false));
    }

    /// Every action of the job must fit on some host, ever.
    fn validate_feasibility(&self, compound: &CompoundJob) -> SimResult<()> {
        let platform = self.ctx.sim().platform();
        for action in compound.actions() {
            let fits = self.hosts.iter().any(|h| {
                let cores = platform
                    .host_cores(h.as_str())
                    .map(|c| self.core_cap.map_or(c, |cap| c.min(cap)))
                    .unwrap_or(0);
                let ram = platform.host_memory(h.as_str()).unwrap_or(0);
                cores >= action.min_cores() && ram >= action.min_ram()
            });
            if !fits {
                return Err(FailureCause::NotEnoughResources {
                    job: compound.name(),
                    service: self.ctx.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Parse per-action service-specific arguments: `action -> host[:cores]`.
    fn parse_run_specs(
        &self,
        compound: &CompoundJob,
        args: &ServiceJobArgs,
    ) -> SimResult<HashMap<String, RunSpec>> {
        let mut specs = HashMap::new();
        for (key, value) in args {
            let Some(action) = compound.action(key) else {
                return Err(self.not_allowed(format!("no action '{key}' in job")));
            };
            let (host, cores) = match value.split_once(':') {
                Some((host, cores)) => {
                    let cores: usize = cores
                        .parse()
                        .map_err(|_| self.not_allowed(format!("bad core count '{value}'")))?;
                    (host, Some(cores))
                }
                None => (value.as_str(), None),
            };
            let host = (!host.is_empty()).then(|| HostName::new(host));
            if let Some(h) = &host {
                if !self.hosts.iter().any(|known| known == h) {
                    return Err(self.not_allowed(format!("unknown host '{h}'")));
                }
            }
            specs.insert(action.name(), RunSpec { host, num_cores: cores });
        }
        Ok(specs)
    }

    async fn submit_ready_actions(
        &self,
        compound: &CompoundJob,
        run_specs: &HashMap<String, RunSpec>,
    ) -> SimResult<()> {
        let aes = self.aes_endpoint()?;
        let sim = self.ctx.sim().clone();
        for action in compound.mark_ready_actions() {
            let spec = run_specs.get(&action.name()).cloned().unwrap_or_default();
            aes::submit_action(&sim, &aes, &action, spec).await?;
        }
        Ok(())
    }

    async fn handle_submit_standard(
        &mut self,
        job: StandardJob,
        args: ServiceJobArgs,
        notify: Endpoint,
    ) -> SimResult<()> {
        if !self.support.standard {
            return Err(FailureCause::JobTypeNotSupported {
                job: job.name(),
                service: self.ctx.name.clone(),
            });
        }
        let name = job.name();
        if self.jobs.contains_key(&name) {
            return Err(self.not_allowed(format!("job '{name}' already submitted")));
        }
        decompose_standard_job(&job, &self.ctx.name, self.scratch.as_ref())?;
        let compound = job.compound();
        self.validate_feasibility(&compound)?;
        let run_specs = self.parse_run_specs(&compound, &args)?;

        compound.set_service(Some(self.ctx.name.clone()));
        compound.set_submit_date(self.ctx.now());
        self.submit_ready_actions(&compound, &run_specs).await?;
        job.set_state(JobState::Running);
        tracing::info!(
            service = %self.ctx.name,
            job = %name,
            actions = compound.action_count(),
            "standard job submitted"
        );
        self.jobs.insert(
            name,
            HostedJob {
                payload: JobPayload::Standard(job),
                compound,
                run_specs,
                notify,
                done_sent: false,
            },
        );
        Ok(())
    }

    async fn handle_submit_compound(
        &mut self,
        job: CompoundJob,
        args: ServiceJobArgs,
        notify: Endpoint,
    ) -> SimResult<()> {
        if !self.support.standard {
            return Err(FailureCause::JobTypeNotSupported {
                job: job.name(),
                service: self.ctx.name.clone(),
            });
        }
        let name = job.name();
        if self.jobs.contains_key(&name) {
            return Err(self.not_allowed(format!("job '{name}' already submitted")));
        }
        self.validate_feasibility(&job)?;
        let run_specs = self.parse_run_specs(&job, &args)?;
        job.set_service(Some(self.ctx.name.clone()));
        job.set_submit_date(self.ctx.now());
        self.submit_ready_actions(&job, &run_specs).await?;
        job.set_state(JobState::Running);
        tracing::info!(service = %self.ctx.name, job = %name, "compound job submitted");
        self.jobs.insert(
            name,
            HostedJob {
                payload: JobPayload::Compound(job.clone()),
                compound: job,
                run_specs,
                notify,
                done_sent: false,
            },
        );
        Ok(())
    }

    async fn handle_submit_pilot(
        &mut self,
        pilot: PilotJob,
        args: ServiceJobArgs,
        notify: Endpoint,
    ) -> SimResult<()> {
        if !self.support.pilot {
            return Err(FailureCause::JobTypeNotSupported {
                job: pilot.name(),
                service: self.ctx.name.clone(),
            });
        }
        let name = pilot.name();
        if self.pilots.contains_key(&name) {
            return Err(self.not_allowed(format!("pilot '{name}' already submitted")));
        }
        let expires = match args.get("-t") {
            Some(minutes) => {
                let minutes: u64 = minutes
                    .parse()
                    .map_err(|_| self.not_allowed(format!("bad walltime '{minutes}'")))?;
                Some(self.ctx.now() + 60.0 * minutes as f64)
            }
            None => None,
        };
        self.pilot_seq += 1;
        let nested_name =
            ServiceName::new(format!("{}_pilot{}", self.ctx.name, self.pilot_seq));
        let sim = self.ctx.sim().clone();
        let nested_ctx = sim.service_ctx(
            nested_name.clone(),
            self.ctx.host.clone(),
            self.ctx.properties.clone(),
        );
        let mut nested = BareMetalComputeService::new(
            nested_ctx,
            self.hosts.clone(),
            JobSupport::standard_only(),
            self.scratch.clone(),
        );
        if let Some(cap) = self.core_cap {
            nested = nested.with_core_cap(cap);
        }
        sim.launch(nested, false);

        pilot.set_compute_service(Some(nested_name.clone()));
        pilot.set_state(JobState::Running);
        tracing::info!(
            service = %self.ctx.name,
            pilot = %name,
            nested = %nested_name,
            expires,
            "pilot job started"
        );
        let started = Message::Compute(ComputeMessage::PilotStarted {
            job: pilot.clone(),
            source: self.ctx.name.clone(),
            compute_service: nested_name.clone(),
        });
        if let Err(cause) = notify.put(started).await {
            tracing::debug!(%cause, "pilot submitter is gone");
        }

        if let Some(body) = pilot.body() {
            let payload = match body {
                dr_core::JobBody::Standard(j) => JobPayload::Standard(j),
                dr_core::JobBody::Compound(j) => JobPayload::Compound(j),
            };
            let inner = payload.clone();
            if let Err(cause) = client::submit_job(
                &sim,
                nested_name.as_str(),
                payload,
                ServiceJobArgs::new(),
                notify.clone(),
            )
            .await
            {
                tracing::warn!(pilot = %name, %cause, "pilot body submission failed");
                inner.set_state(JobState::Failed);
                let done = Message::Compute(ComputeMessage::JobDone {
                    job: inner,
                    source: self.ctx.name.clone(),
                    result: Err(cause),
                });
                if let Err(cause) = notify.put(done).await {
                    tracing::debug!(%cause, "pilot submitter is gone");
                }
            }
        }

        self.pilots.insert(name, PilotRun { pilot, service: nested_name, notify, expires });
        Ok(())
    }

    /// Fail a job: kill what still runs, attach the cause, notify once.
    async fn fail_job(&mut self, job_name: &str, cause: FailureCause, reset_actions: bool) {
        let Some(hosted) = self.jobs.get_mut(job_name) else { return };
        if hosted.done_sent {
            return;
        }
        hosted.done_sent = true;
        let compound = hosted.compound.clone();
        let payload = hosted.payload.clone();
        let notify = hosted.notify.clone();

        let sim = self.ctx.sim().clone();
        if let Ok(aes) = self.aes_endpoint() {
            for action in compound.actions() {
                match action.state() {
                    ActionState::Ready | ActionState::Started => {
                        let _ = aes::terminate_action(
                            &sim,
                            &aes,
                            &action,
                            TerminationCause::JobKilled,
                        )
                        .await;
                    }
                    ActionState::NotReady => {
                        action.set_state(ActionState::Killed);
                        action.set_failure_cause(Some(cause.clone()));
                    }
                    _ => {}
                }
            }
        }
        if reset_actions {
            compound.reset_unfinished_actions();
        }
        payload.set_state(JobState::Failed);
        compound.set_end_date(self.ctx.now());
        tracing::info!(service = %self.ctx.name, job = job_name, %cause, "job failed");
        let done = Message::Compute(ComputeMessage::JobDone {
            job: payload,
            source: self.ctx.name.clone(),
            result: Err(cause),
        });
        if let Err(cause) = notify.put(done).await {
            tracing::debug!(%cause, "submitter is gone");
        }
    }

    async fn handle_action_done(&mut self, action: Action) {
        let Some(job_name) = action.job() else { return };
        let Some(hosted) = self.jobs.get(&job_name) else { return };
        if hosted.done_sent {
            return;
        }
        let compound = hosted.compound.clone();
        let run_specs = hosted.run_specs.clone();
        let payload = hosted.payload.clone();
        let notify = hosted.notify.clone();

        match action.state() {
            ActionState::Completed => {
                if let Err(cause) = self.submit_ready_actions(&compound, &run_specs).await {
                    self.fail_job(&job_name, cause, false).await;
                    return;
                }
                if compound.completed() {
                    if let Some(hosted) = self.jobs.get_mut(&job_name) {
                        hosted.done_sent = true;
                    }
                    payload.set_state(JobState::Completed);
                    compound.set_end_date(self.ctx.now());
                    tracing::info!(service = %self.ctx.name, job = %job_name, "job completed");
                    let done = Message::Compute(ComputeMessage::JobDone {
                        job: payload,
                        source: self.ctx.name.clone(),
                        result: Ok(()),
                    });
                    if let Err(cause) = notify.put(done).await {
                        tracing::debug!(%cause, "submitter is gone");
                    }
                }
            }
            ActionState::Failed | ActionState::Killed => {
                let cause = action.failure_cause().unwrap_or(FailureCause::JobKilled {
                    job: job_name.clone(),
                });
                self.fail_job(&job_name, cause, false).await;
            }
            other => {
                tracing::warn!(action = %action.name(), state = %other, "unexpected action state");
            }
        }
    }

    async fn handle_terminate_job(&mut self, job: &JobPayload) -> SimResult<()> {
        let name = job.name();
        if let JobPayload::Pilot(_) = job {
            let Some(run) = self.pilots.remove(&name) else {
                return Err(FailureCause::JobCannotBeTerminated { job: name });
            };
            let sim = self.ctx.sim().clone();
            if let Err(cause) =
                sim.stop_service(run.service.as_str(), true, TerminationCause::ServiceTerminated).await
            {
                tracing::debug!(%cause, "nested pilot service already down");
            }
            run.pilot.set_state(JobState::Terminated);
            tracing::info!(service = %self.ctx.name, pilot = %name, "pilot terminated");
            return Ok(());
        }
        let Some(hosted) = self.jobs.get_mut(&name) else {
            return Err(FailureCause::JobCannotBeTerminated { job: name });
        };
        if hosted.done_sent || hosted.payload.state().is_terminal() {
            return Err(FailureCause::JobCannotBeTerminated { job: name });
        }
        hosted.done_sent = true;
        let compound = hosted.compound.clone();
        let payload = hosted.payload.clone();
        let sim = self.ctx.sim().clone();
        if let Ok(aes) = self.aes_endpoint() {
            for action in compound.actions() {
                if matches!(action.state(), ActionState::Ready | ActionState::Started) {
                    let _ = aes::terminate_action(&sim, &aes, &action, TerminationCause::JobKilled)
                        .await;
                }
            }
        }
        compound.reset_unfinished_actions();
        payload.set_state(JobState::Terminated);
        compound.set_end_date(self.ctx.now());
        tracing::info!(service = %self.ctx.name, job = %name, "job terminated");
        Ok(())
    }

    async fn end_pilot(&mut self, name: &str, expired: bool) {
        let Some(run) = self.pilots.remove(name) else { return };
        let sim = self.ctx.sim().clone();
        if let Err(cause) = sim
            .stop_service(run.service.as_str(), true, TerminationCause::ServiceTerminated)
            .await
        {
            tracing::debug!(%cause, "nested pilot service already down");
        }
        if expired {
            run.pilot.set_state(JobState::Completed);
            tracing::info!(service = %self.ctx.name, pilot = name, "pilot expired");
            let msg = Message::Compute(ComputeMessage::PilotExpired {
                job: run.pilot.clone(),
                source: self.ctx.name.clone(),
            });
            if let Err(cause) = run.notify.put(msg).await {
                tracing::debug!(%cause, "pilot submitter is gone");
            }
        } else {
            run.pilot.set_state(JobState::Terminated);
        }
    }

    async fn expire_pilots(&mut self) {
        let now = self.ctx.now();
        let expired: Vec<String> = self
            .pilots
            .iter()
            .filter(|(_, run)| run.expires.is_some_and(|e| e <= now + 1e-9))
            .map(|(name, _)| name.clone())
            .collect();
        for name in expired {
            self.end_pilot(&name, true).await;
        }
    }

    fn next_deadline(&self) -> Option<f64> {
        self.pilots.values().filter_map(|run| run.expires).fold(None, |acc, e| {
            Some(acc.map_or(e, |a: f64| a.min(e)))
        })
    }

    async fn handle_stop(&mut self, notify_pending: bool, cause: TerminationCause) {
        let sim = self.ctx.sim().clone();
        if let Err(err) = sim.stop_service(self.aes_name.as_str(), false, cause).await {
            tracing::debug!(%err, "embedded AES already down");
        }
        let pilot_names: Vec<String> = self.pilots.keys().cloned().collect();
        for name in pilot_names {
            self.end_pilot(&name, false).await;
        }
        let job_names: Vec<String> = self.jobs.keys().cloned().collect();
        for name in job_names {
            let terminal = self
                .jobs
                .get(&name)
                .map(|h| h.done_sent || h.payload.state().is_terminal())
                .unwrap_or(true);
            if terminal {
                continue;
            }
            let failure = cause.to_failure(&self.ctx.name, &name);
            if notify_pending {
                let reset = cause == TerminationCause::ServiceTerminated;
                self.fail_job(&name, failure, reset).await;
            } else if let Some(hosted) = self.jobs.get_mut(&name) {
                hosted.done_sent = true;
                hosted.payload.set_state(JobState::Failed);
            }
        }
    }

    async fn handle_message(&mut self, msg: Message) -> bool {
        match msg {
            Message::Compute(ComputeMessage::SubmitJob { job, args, notify, reply }) => {
                let result = match job {
                    JobPayload::Standard(j) => self.handle_submit_standard(j, args, notify).await,
                    JobPayload::Compound(j) => self.handle_submit_compound(j, args, notify).await,
                    JobPayload::Pilot(j) => self.handle_submit_pilot(j, args, notify).await,
                };
                let answer = Message::Compute(ComputeMessage::SubmitJobReply { result });
                if let Err(cause) = reply.put(answer).await {
                    tracing::debug!(%cause, "submitter is gone");
                }
                true
            }
            Message::Compute(ComputeMessage::TerminateJob { job, reply }) => {
                let result = self.handle_terminate_job(&job).await;
                let answer = Message::Compute(ComputeMessage::TerminateJobReply { result });
                if let Err(cause) = reply.put(answer).await {
                    tracing::debug!(%cause, "terminator is gone");
                }
                true
            }
            Message::Compute(ComputeMessage::StartTimeEstimates { reply, .. }) => {
                let result = Err(FailureCause::FunctionalityNotAvailable {
                    service: self.ctx.name.clone(),
                    functionality: "start time estimates".into(),
                });
                let answer = Message::Compute(ComputeMessage::StartTimeEstimatesReply { result });
                if let Err(cause) = reply.put(answer).await {
                    tracing::debug!(%cause, "requester is gone");
                }
                true
            }
            Message::Aes(AesMessage::ActionDone { action }) => {
                self.handle_action_done(action).await;
                true
            }
            Message::Aes(AesMessage::ResourceInfo { reply }) => {
                let result = match self.aes_endpoint() {
                    Ok(aes) => aes::resource_information(self.ctx.sim(), &aes).await,
                    Err(cause) => Err(cause),
                };
                match result {
                    Ok(info) => {
                        let answer = Message::Aes(AesMessage::ResourceInfoReply { info });
                        if let Err(cause) = reply.put(answer).await {
                            tracing::debug!(%cause, "requester is gone");
                        }
                    }
                    Err(cause) => {
                        tracing::warn!(%cause, "resource info unavailable");
                    }
                }
                true
            }
            Message::Control(ControlMessage::Stop { notify_pending, cause, reply }) => {
                self.handle_stop(notify_pending, cause).await;
                let answer =
                    Message::Control(ControlMessage::Stopped { service: self.ctx.name.clone() });
                if let Err(cause) = reply.put(answer).await {
                    tracing::debug!(%cause, "stopper is gone");
                }
                false
            }
            Message::Control(ControlMessage::Suspend { reply }) => {
                let sim = self.ctx.sim().clone();
                if let Err(cause) = sim.suspend_service(self.aes_name.as_str()).await {
                    tracing::warn!(%cause, "could not suspend embedded AES");
                }
                sim.registry().set_state(self.ctx.name.as_str(), ServiceState::Suspended);
                let answer =
                    Message::Control(ControlMessage::Suspended { service: self.ctx.name.clone() });
                if let Err(cause) = reply.put(answer).await {
                    tracing::debug!(%cause, "suspender is gone");
                }
                true
            }
            Message::Control(ControlMessage::Resume { reply }) => {
                let sim = self.ctx.sim().clone();
                if let Err(cause) = sim.resume_service(self.aes_name.as_str()).await {
                    tracing::warn!(%cause, "could not resume embedded AES");
                }
                sim.registry().set_state(self.ctx.name.as_str(), ServiceState::Up);
                let answer =
                    Message::Control(ControlMessage::Resumed { service: self.ctx.name.clone() });
                if let Err(cause) = reply.put(answer).await {
                    tracing::debug!(%cause, "resumer is gone");
                }
                true
            }
            other => {
                tracing::warn!(service = %self.ctx.name, msg = other.name(), "unexpected message");
                true
            }
        }
    }
}

#[async_trait::async_trait]
impl Service for BareMetalComputeService {
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
        self.support
    }

    fn scratch(&self) -> Option<ServiceName> {
        self.scratch.clone()
    }

    async fn main(&mut self) -> u8 {
        self.launch_aes();
        tracing::info!(
            service = %self.ctx.name,
            hosts = self.hosts.len(),
            standard = self.support.standard,
            pilot = self.support.pilot,
            "bare-metal compute service up"
        );
        loop {
            let timeout = self.next_deadline().map(|d| (d - self.ctx.now()).max(0.0));
            match self.ctx.commport.get(timeout).await {
                Ok(msg) => {
                    if !self.handle_message(msg).await {
                        break;
                    }
                }
                Err(FailureCause::NetworkTimeout { .. }) => {}
                Err(_) => break,
            }
            self.expire_pilots().await;
        }
        0
    }
}

/// Translate a standard job into its action DAG.
///
/// With a scratch storage, inputs are staged in, tasks read/write on
/// scratch under a job-scoped prefix, declared outputs are staged out to
/// their placements, and every scratch file is deleted at the end.
/// Without one, reads and writes go straight to the declared placements.
pub(crate) fn decompose_standard_job(
    job: &StandardJob,
    service: &ServiceName,
    scratch: Option<&ServiceName>,
) -> SimResult<()> {
    let compound = job.compound();
    if compound.action_count() > 0 {
        return Err(FailureCause::NotAllowed {
            service: service.clone(),
            reason: format!("job '{}' was already decomposed", job.name()),
        });
    }
    let invalid = |reason: String| FailureCause::NotAllowed { service: service.clone(), reason };
    let graph_err =
        |e: dr_core::JobError| FailureCause::NotAllowed { service: service.clone(), reason: e.to_string() };

    let scratch_prefix = format!("/{}", job.name());
    let scratch_loc = |file: &dr_core::DataFile| {
        scratch.map(|s| FileLocation::new(s.clone(), scratch_prefix.clone(), file.clone()))
    };

    let tasks = job.tasks();
    let produced: HashMap<dr_core::DataFile, String> = tasks
        .iter()
        .flat_map(|t| t.outputs.iter().map(move |f| (f.clone(), t.name.clone())))
        .collect();

    // Explicit pre-copies.
    let mut pre_actions: Vec<Action> = Vec::new();
    for (index, (src, dst)) in job.pre_copies().into_iter().enumerate() {
        let action = compound
            .add_file_copy_action(format!("pre_copy{index}"), src, dst)
            .map_err(graph_err)?;
        pre_actions.push(action);
    }

    // Stage-in one copy per distinct input that is not produced by a
    // sibling task.
    let mut stage_ins: IndexMap<dr_core::DataFile, Action> = IndexMap::new();
    if scratch.is_some() {
        for task in &tasks {
            for file in &task.inputs {
                if produced.contains_key(file) || stage_ins.contains_key(file) {
                    continue;
                }
                let placement = job
                    .placement(file)
                    .ok_or_else(|| invalid(format!("no placement for input file '{file}'")))?;
                let dst = scratch_loc(file).unwrap_or(placement.clone());
                let action = compound
                    .add_file_copy_action(format!("stage_in_{file}"), placement, dst)
                    .map_err(graph_err)?;
                for pre in &pre_actions {
                    compound.add_dependency(pre, &action).map_err(graph_err)?;
                }
                stage_ins.insert(file.clone(), action);
            }
        }
    }

    let mut work_actions: Vec<Action> = Vec::new();
    let mut scratch_files: IndexMap<dr_core::DataFile, ()> = IndexMap::new();
    let mut writes_by_file: HashMap<dr_core::DataFile, Action> = HashMap::new();
    let mut reads_by_task: HashMap<String, Vec<Action>> = HashMap::new();

    // Per-task read -> compute -> write chains.
    for task in &tasks {
        let compute = compound
            .add_compute_action(&task.name, task.flops, task.min_cores, task.max_cores, task.ram)
            .map_err(graph_err)?;

        for file in &task.inputs {
            let location = match scratch_loc(file) {
                Some(loc) => {
                    scratch_files.insert(file.clone(), ());
                    loc
                }
                None => job
                    .placement(file)
                    .ok_or_else(|| invalid(format!("no placement for input file '{file}'")))?,
            };
            let read = compound
                .add_file_read_action(format!("read_{}_{}", task.name, file), location)
                .map_err(graph_err)?;
            if let Some(stage) = stage_ins.get(file) {
                compound.add_dependency(stage, &read).map_err(graph_err)?;
            }
            for pre in &pre_actions {
                compound.add_dependency(pre, &read).map_err(graph_err)?;
            }
            compound.add_dependency(&read, &compute).map_err(graph_err)?;
            reads_by_task.entry(task.name.clone()).or_default().push(read);
        }
        if task.inputs.is_empty() {
            for pre in &pre_actions {
                compound.add_dependency(pre, &compute).map_err(graph_err)?;
            }
        }

        for file in &task.outputs {
            let placement = job.placement(file);
            let (write_loc, stage_out_to) = match (scratch_loc(file), placement) {
                (Some(scratch), placement) => {
                    scratch_files.insert(file.clone(), ());
                    (scratch, placement)
                }
                (None, Some(placement)) => (placement, None),
                (None, None) => {
                    return Err(invalid(format!(
                        "no placement for output file '{file}' and no scratch space"
                    )))
                }
            };
            let write = compound
                .add_file_write_action(format!("write_{}_{}", task.name, file), write_loc.clone())
                .map_err(graph_err)?;
            compound.add_dependency(&compute, &write).map_err(graph_err)?;
            writes_by_file.insert(file.clone(), write.clone());
            work_actions.push(write.clone());
            if let Some(out) = stage_out_to {
                let stage_out = compound
                    .add_file_copy_action(
                        format!("stage_out_{}_{}", task.name, file),
                        write_loc,
                        out,
                    )
                    .map_err(graph_err)?;
                compound.add_dependency(&write, &stage_out).map_err(graph_err)?;
                work_actions.push(stage_out);
            }
        }
        work_actions.push(compute);
    }

    // A task consuming a sibling's output waits for that write.
    for task in &tasks {
        for file in &task.inputs {
            if let Some(write) = writes_by_file.get(file) {
                if let Some(reads) = reads_by_task.get(&task.name) {
                    for read in reads {
                        let reads_this = read.name() == format!("read_{}_{}", task.name, file);
                        if reads_this {
                            compound.add_dependency(write, read).map_err(graph_err)?;
                        }
                    }
                }
            }
        }
    }

    // Cleanup: delete scratch files and honour explicit post-deletes after
    // all work.
    let mut cleanups: Vec<Action> = Vec::new();
    for file in scratch_files.keys() {
        if let Some(loc) = scratch_loc(file) {
            let action = compound
                .add_file_delete_action(format!("clean_{file}"), loc)
                .map_err(graph_err)?;
            cleanups.push(action);
        }
    }
    for (index, loc) in job.post_deletes().into_iter().enumerate() {
        let action = compound
            .add_file_delete_action(format!("post_delete{index}"), loc)
            .map_err(graph_err)?;
        cleanups.push(action);
    }
    for cleanup in &cleanups {
        for work in &work_actions {
            compound.add_dependency(work, cleanup).map_err(graph_err)?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "bare_metal_tests.rs"]
mod tests;
