// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Batch compute service.
//!
//! Time-slotted, node-exclusive scheduling of `{-N, -c, -t}` jobs.
//! Dispatch launches an embedded bare-metal service on the allocation for
//! the job's walltime; the deadline is enforced by the main loop, which
//! waits for whichever comes first — the next message or the next
//! deadline. Pilot jobs get the allocation itself, expiring with
//! `PilotExpired` and a `ServiceIsDown` cascade for their inner jobs.

use crate::bare_metal::BareMetalComputeService;
use crate::client;
use crate::schedule::{BatchArgs, HostSelection, SchedulingAlgorithm, Timeline};
use dr_core::{
    FailureCause, HostName, JobPayload, JobState, ServiceJobArgs, ServiceName, SimResult,
    TerminationCause,
};
use dr_engine::registry::{JobSupport, ServiceKind};
use dr_engine::service::{Service, ServiceCtx};
use dr_wire::{
    ComputeMessage, ControlMessage, Endpoint, EstimateCandidate, Message, StartTimeEstimate,
};
use std::collections::{HashMap, VecDeque};

/// `FCFS`, `conservative_bf`, or `easy_bf`.
pub const BATCH_SCHEDULING_ALGORITHM: &str = "BATCH_SCHEDULING_ALGORITHM";
/// `FIRSTFIT`, `BESTFIT`, or `ROUNDROBIN`.
pub const HOST_SELECTION_ALGORITHM: &str = "HOST_SELECTION_ALGORITHM";
/// Seconds added to every deadline (and to start-time estimates).
pub const BATCH_RJMS_PADDING_DELAY: &str = "BATCH_RJMS_PADDING_DELAY";

/// A job wrapped with its batch request.
struct QueuedJob {
    job: JobPayload,
    args: BatchArgs,
    notify: Endpoint,
    submitted_at: f64,
}

struct RunningJob {
    job: JobPayload,
    args: BatchArgs,
    notify: Endpoint,
    service: ServiceName,
    allocation: Vec<HostName>,
    deadline: f64,
    pilot: bool,
}

/// Batch-scheduled compute service over a homogeneous host pool.
pub struct BatchComputeService {
    ctx: ServiceCtx,
    hosts: Vec<HostName>,
    cores_per_host: usize,
    algorithm: SchedulingAlgorithm,
    host_selection: HostSelection,
    padding: f64,
    queue: VecDeque<QueuedJob>,
    running: HashMap<String, RunningJob>,
    busy_hosts: HashMap<HostName, String>,
    rr_cursor: usize,
    seq: usize,
}

impl BatchComputeService {
    pub fn new(ctx: ServiceCtx, hosts: Vec<HostName>) -> SimResult<Self> {
        let platform = ctx.sim().platform();
        let cores_per_host = hosts
            .iter()
            .map(|h| platform.host_cores(h.as_str()).unwrap_or(0))
            .min()
            .unwrap_or(0);
        if hosts.is_empty() || cores_per_host == 0 {
            return Err(FailureCause::NotAllowed {
                service: ctx.name.clone(),
                reason: "a batch service needs at least one host with cores".into(),
            });
        }
        let algorithm = SchedulingAlgorithm::parse(
            &ctx.properties.get_string(BATCH_SCHEDULING_ALGORITHM, "FCFS"),
            &ctx.name,
        )?;
        let host_selection = HostSelection::parse(
            &ctx.properties.get_string(HOST_SELECTION_ALGORITHM, "FIRSTFIT"),
            &ctx.name,
        )?;
        let padding = ctx.properties.get_f64(BATCH_RJMS_PADDING_DELAY, 0.0).unwrap_or(0.0);
        Ok(Self {
            ctx,
            hosts,
            cores_per_host,
            algorithm,
            host_selection,
            padding,
            queue: VecDeque::new(),
            running: HashMap::new(),
            busy_hosts: HashMap::new(),
            rr_cursor: 0,
            seq: 0,
        })
    }

    fn free_host_count(&self) -> usize {
        self.hosts.len() - self.busy_hosts.len()
    }

    /// Pick `nodes` free hosts per the host-selection policy.
    fn select_hosts(&mut self, nodes: usize, cores_per_node: usize) -> Option<Vec<HostName>> {
        let platform = self.ctx.sim().platform();
        let free: Vec<HostName> = self
            .hosts
            .iter()
            .filter(|h| !self.busy_hosts.contains_key(*h) && platform.host_is_on(h.as_str()))
            .cloned()
            .collect();
        if free.len() < nodes {
            return None;
        }
        let picked = match self.host_selection {
            HostSelection::FirstFit => free.into_iter().take(nodes).collect(),
            HostSelection::BestFit => {
                // Smallest core surplus over the request first.
                let mut scored: Vec<(usize, HostName)> = free
                    .into_iter()
                    .map(|h| {
                        let cores = platform.host_cores(h.as_str()).unwrap_or(0);
                        (cores.saturating_sub(cores_per_node), h)
                    })
                    .collect();
                scored.sort_by_key(|(surplus, _)| *surplus);
                scored.into_iter().take(nodes).map(|(_, h)| h).collect()
            }
            HostSelection::RoundRobin => {
                let mut picked = Vec::with_capacity(nodes);
                let total = self.hosts.len();
                let mut probe = 0;
                while picked.len() < nodes && probe < total {
                    let host = &self.hosts[(self.rr_cursor + probe) % total];
                    probe += 1;
                    if free.contains(host) {
                        picked.push(host.clone());
                    }
                }
                self.rr_cursor = (self.rr_cursor + probe) % total;
                picked
            }
        };
        Some(picked)
    }

    /// Current schedule as a free-node step function: running jobs hold
    /// their nodes until their deadlines.
    fn running_timeline(&self, now: f64) -> Timeline {
        let mut timeline = Timeline::new(now, self.hosts.len());
        for run in self.running.values() {
            timeline.reserve(now, run.deadline.max(now), run.args.nodes);
        }
        timeline
    }

    /// Index into the queue of the next job allowed to start now, per the
    /// scheduling algorithm.
    fn next_dispatchable(&self, now: f64) -> Option<usize> {
        if self.queue.is_empty() {
            return None;
        }
        let head_fits = self.queue[0].args.nodes <= self.free_host_count();
        match self.algorithm {
            SchedulingAlgorithm::Fcfs => head_fits.then_some(0),
            SchedulingAlgorithm::EasyBf => {
                if head_fits {
                    return Some(0);
                }
                // Reserve the head's window, then let anything start that
                // does not delay it.
                let mut timeline = self.running_timeline(now);
                let head = &self.queue[0];
                let head_start =
                    timeline.earliest_start(head.args.nodes, head.args.walltime_seconds(), now);
                timeline.reserve(
                    head_start,
                    head_start + head.args.walltime_seconds(),
                    head.args.nodes,
                );
                for (index, job) in self.queue.iter().enumerate().skip(1) {
                    if job.args.nodes > self.free_host_count() {
                        continue;
                    }
                    let start =
                        timeline.earliest_start(job.args.nodes, job.args.walltime_seconds(), now);
                    if start <= now + 1e-9 {
                        return Some(index);
                    }
                }
                None
            }
            SchedulingAlgorithm::ConservativeBf => {
                // Every queued job holds its reservation, in order; any
                // job whose reserved start is now may run.
                let mut timeline = self.running_timeline(now);
                for (index, job) in self.queue.iter().enumerate() {
                    let start =
                        timeline.earliest_start(job.args.nodes, job.args.walltime_seconds(), now);
                    timeline.reserve(start, start + job.args.walltime_seconds(), job.args.nodes);
                    if start <= now + 1e-9 && job.args.nodes <= self.free_host_count() {
                        return Some(index);
                    }
                }
                None
            }
        }
    }

    async fn dispatch_job(&mut self, queued: QueuedJob) -> bool {
        let now = self.ctx.now();
        let Some(allocation) = self.select_hosts(queued.args.nodes, queued.args.cores_per_node)
        else {
            // Free-count said yes but the platform disagrees (hosts off);
            // requeue at the front and stop this pass.
            self.queue.push_front(queued);
            return false;
        };
        let name = queued.job.name();
        let deadline = now + queued.args.walltime_seconds() + self.padding;
        self.seq += 1;
        let nested_name = ServiceName::new(format!("{}_alloc{}", self.ctx.name, self.seq));
        let sim = self.ctx.sim().clone();
        let nested_ctx = sim.service_ctx(
            nested_name.clone(),
            allocation[0].clone(),
            self.ctx.properties.clone(),
        );
        let nested = BareMetalComputeService::new(
            nested_ctx,
            allocation.clone(),
            JobSupport::standard_only(),
            self.ctx.sim().registry().entry(self.ctx.name.as_str()).and_then(|e| e.scratch),
        )
        .with_core_cap(queued.args.cores_per_node);
        sim.launch(nested, false);

        for host in &allocation {
            self.busy_hosts.insert(host.clone(), name.clone());
        }
        tracing::info!(
            service = %self.ctx.name,
            job = %name,
            nodes = queued.args.nodes,
            waited = now - queued.submitted_at,
            deadline,
            "batch job dispatched"
        );

        let pilot = matches!(queued.job, JobPayload::Pilot(_));
        match &queued.job {
            JobPayload::Pilot(p) => {
                p.set_compute_service(Some(nested_name.clone()));
                p.set_state(JobState::Running);
                let started = Message::Compute(ComputeMessage::PilotStarted {
                    job: p.clone(),
                    source: self.ctx.name.clone(),
                    compute_service: nested_name.clone(),
                });
                if let Err(cause) = queued.notify.put(started).await {
                    tracing::debug!(%cause, "pilot submitter is gone");
                }
                if let Some(body) = p.body() {
                    let payload = match body {
                        dr_core::JobBody::Standard(j) => JobPayload::Standard(j),
                        dr_core::JobBody::Compound(j) => JobPayload::Compound(j),
                    };
                    if let Err(cause) = client::submit_job(
                        &sim,
                        nested_name.as_str(),
                        payload,
                        ServiceJobArgs::new(),
                        queued.notify.clone(),
                    )
                    .await
                    {
                        tracing::warn!(pilot = %name, %cause, "pilot body submission failed");
                    }
                }
            }
            payload => {
                // The embedded service notifies us, so we can release the
                // allocation before forwarding to the real submitter.
                if let Err(cause) = client::submit_job(
                    &sim,
                    nested_name.as_str(),
                    payload.clone(),
                    ServiceJobArgs::new(),
                    self.ctx.endpoint(),
                )
                .await
                {
                    tracing::warn!(job = %name, %cause, "embedded submission failed");
                    for host in &allocation {
                        self.busy_hosts.remove(host);
                    }
                    let _ = sim
                        .stop_service(nested_name.as_str(), false, TerminationCause::ServiceTerminated)
                        .await;
                    queued.job.set_state(JobState::Failed);
                    let done = Message::Compute(ComputeMessage::JobDone {
                        job: queued.job.clone(),
                        source: self.ctx.name.clone(),
                        result: Err(cause),
                    });
                    if let Err(cause) = queued.notify.put(done).await {
                        tracing::debug!(%cause, "submitter is gone");
                    }
                    return true;
                }
            }
        }

        self.running.insert(
            name,
            RunningJob {
                job: queued.job,
                args: queued.args,
                notify: queued.notify,
                service: nested_name,
                allocation,
                deadline,
                pilot,
            },
        );
        true
    }

    async fn dispatch_pending(&mut self) {
        loop {
            let now = self.ctx.now();
            let Some(index) = self.next_dispatchable(now) else { break };
            let Some(queued) = self.queue.remove(index) else { break };
            if !self.dispatch_job(queued).await {
                break;
            }
        }
    }

    fn release_allocation(&mut self, run: &RunningJob) {
        for host in &run.allocation {
            self.busy_hosts.remove(host);
        }
    }

    /// A terminal notification from an embedded bare-metal service.
    async fn handle_embedded_done(&mut self, job: JobPayload, result: SimResult<()>) {
        let name = job.name();
        let Some(run) = self.running.remove(&name) else {
            tracing::debug!(job = %name, "stale notification from an embedded service");
            return;
        };
        self.release_allocation(&run);
        let sim = self.ctx.sim().clone();
        if let Err(cause) = sim
            .stop_service(run.service.as_str(), false, TerminationCause::ServiceTerminated)
            .await
        {
            tracing::debug!(%cause, "embedded service already down");
        }
        let done = Message::Compute(ComputeMessage::JobDone {
            job,
            source: self.ctx.name.clone(),
            result,
        });
        if let Err(cause) = run.notify.put(done).await {
            tracing::debug!(%cause, "submitter is gone");
        }
    }

    /// Enforce walltimes: time out standard jobs, expire pilots.
    async fn expire_deadlines(&mut self) {
        let now = self.ctx.now();
        let due: Vec<String> = self
            .running
            .iter()
            .filter(|(_, run)| run.deadline <= now + 1e-9)
            .map(|(name, _)| name.clone())
            .collect();
        for name in due {
            let Some(run) = self.running.remove(&name) else { continue };
            self.release_allocation(&run);
            let sim = self.ctx.sim().clone();
            // Cascade-stop the allocation's service. Pilot inner jobs get
            // their ServiceIsDown notifications from the nested service.
            if let Err(cause) = sim
                .stop_service(run.service.as_str(), run.pilot, TerminationCause::ServiceTerminated)
                .await
            {
                tracing::debug!(%cause, "allocation service already down");
            }
            if run.pilot {
                run.job.set_state(JobState::Completed);
                tracing::info!(service = %self.ctx.name, pilot = %name, "pilot expired");
                if let JobPayload::Pilot(pilot) = &run.job {
                    let msg = Message::Compute(ComputeMessage::PilotExpired {
                        job: pilot.clone(),
                        source: self.ctx.name.clone(),
                    });
                    if let Err(cause) = run.notify.put(msg).await {
                        tracing::debug!(%cause, "pilot submitter is gone");
                    }
                }
            } else {
                run.job.set_state(JobState::Failed);
                tracing::info!(service = %self.ctx.name, job = %name, "batch job timed out");
                let done = Message::Compute(ComputeMessage::JobDone {
                    job: run.job.clone(),
                    source: self.ctx.name.clone(),
                    result: Err(FailureCause::JobTimeout { job: name }),
                });
                if let Err(cause) = run.notify.put(done).await {
                    tracing::debug!(%cause, "submitter is gone");
                }
            }
        }
    }

    fn next_deadline(&self) -> Option<f64> {
        self.running
            .values()
            .map(|run| run.deadline)
            .fold(None, |acc, d| Some(acc.map_or(d, |a: f64| a.min(d))))
    }

    async fn handle_submit(
        &mut self,
        job: JobPayload,
        args: ServiceJobArgs,
        notify: Endpoint,
    ) -> SimResult<()> {
        match &job {
            JobPayload::Standard(_) | JobPayload::Compound(_) => {}
            JobPayload::Pilot(_) => {
                let supports_pilot = self
                    .ctx
                    .sim()
                    .registry()
                    .entry(self.ctx.name.as_str())
                    .map(|e| e.support.pilot)
                    .unwrap_or(true);
                if !supports_pilot {
                    return Err(FailureCause::JobTypeNotSupported {
                        job: job.name(),
                        service: self.ctx.name.clone(),
                    });
                }
            }
        }
        let name = job.name();
        if self.running.contains_key(&name) || self.queue.iter().any(|q| q.job.name() == name) {
            return Err(FailureCause::NotAllowed {
                service: self.ctx.name.clone(),
                reason: format!("job '{name}' already submitted"),
            });
        }
        let parsed =
            BatchArgs::parse(&args, self.hosts.len(), self.cores_per_host, &self.ctx.name)?;
        job.set_state(JobState::Pending);
        tracing::info!(
            service = %self.ctx.name,
            job = %name,
            nodes = parsed.nodes,
            cores = parsed.cores_per_node,
            minutes = parsed.minutes,
            "batch job queued"
        );
        self.queue.push_back(QueuedJob {
            job,
            args: parsed,
            notify,
            submitted_at: self.ctx.now(),
        });
        Ok(())
    }

    async fn handle_terminate(&mut self, job: &JobPayload) -> SimResult<()> {
        let name = job.name();
        if let Some(at) = self.queue.iter().position(|q| q.job.name() == name) {
            if let Some(queued) = self.queue.remove(at) {
                queued.job.set_state(JobState::Terminated);
            }
            return Ok(());
        }
        let Some(run) = self.running.remove(&name) else {
            return Err(FailureCause::JobCannotBeTerminated { job: name });
        };
        self.release_allocation(&run);
        let sim = self.ctx.sim().clone();
        // A terminated pilot cascades ServiceIsDown into its inner jobs; a
        // terminated standard job is resolved by this call alone.
        if let Err(cause) = sim
            .stop_service(run.service.as_str(), run.pilot, TerminationCause::ServiceTerminated)
            .await
        {
            tracing::debug!(%cause, "allocation service already down");
        }
        run.job.set_state(JobState::Terminated);
        tracing::info!(service = %self.ctx.name, job = %name, "batch job terminated");
        Ok(())
    }

    /// Simulate each candidate against the current schedule. Only
    /// meaningful under conservative backfilling, where every queued job
    /// holds a reservation.
    fn start_time_estimates(
        &self,
        candidates: &[EstimateCandidate],
    ) -> SimResult<Vec<StartTimeEstimate>> {
        if self.algorithm != SchedulingAlgorithm::ConservativeBf {
            return Err(FailureCause::FunctionalityNotAvailable {
                service: self.ctx.name.clone(),
                functionality: "start time estimates".into(),
            });
        }
        let now = self.ctx.now();
        let mut timeline = self.running_timeline(now);
        for job in &self.queue {
            let start = timeline.earliest_start(job.args.nodes, job.args.walltime_seconds(), now);
            timeline.reserve(start, start + job.args.walltime_seconds(), job.args.nodes);
        }
        Ok(candidates
            .iter()
            .map(|candidate| {
                let date = if candidate.nodes > self.hosts.len()
                    || candidate.cores_per_node > self.cores_per_host
                {
                    -1.0
                } else {
                    timeline.earliest_start(candidate.nodes, candidate.duration, now)
                        + self.padding
                };
                StartTimeEstimate { key: candidate.key.clone(), date }
            })
            .collect())
    }

    async fn handle_stop(&mut self, notify_pending: bool, cause: TerminationCause) {
        let sim = self.ctx.sim().clone();
        let names: Vec<String> = self.running.keys().cloned().collect();
        for name in names {
            let Some(run) = self.running.remove(&name) else { continue };
            self.release_allocation(&run);
            if let Err(err) = sim
                .stop_service(run.service.as_str(), false, cause)
                .await
            {
                tracing::debug!(%err, "allocation service already down");
            }
            run.job.set_state(JobState::Failed);
            if notify_pending {
                let done = Message::Compute(ComputeMessage::JobDone {
                    job: run.job.clone(),
                    source: self.ctx.name.clone(),
                    result: Err(cause.to_failure(&self.ctx.name, &name)),
                });
                if let Err(err) = run.notify.put(done).await {
                    tracing::debug!(%err, "submitter is gone");
                }
            }
        }
        while let Some(queued) = self.queue.pop_front() {
            queued.job.set_state(JobState::Failed);
            if notify_pending {
                let name = queued.job.name();
                let done = Message::Compute(ComputeMessage::JobDone {
                    job: queued.job.clone(),
                    source: self.ctx.name.clone(),
                    result: Err(cause.to_failure(&self.ctx.name, &name)),
                });
                if let Err(err) = queued.notify.put(done).await {
                    tracing::debug!(%err, "submitter is gone");
                }
            }
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
                let result = self.handle_terminate(&job).await;
                let answer = Message::Compute(ComputeMessage::TerminateJobReply { result });
                if let Err(cause) = reply.put(answer).await {
                    tracing::debug!(%cause, "terminator is gone");
                }
                true
            }
            Message::Compute(ComputeMessage::JobDone { job, result, .. }) => {
                self.handle_embedded_done(job, result).await;
                true
            }
            Message::Compute(ComputeMessage::StartTimeEstimates { candidates, reply }) => {
                let result = self.start_time_estimates(&candidates);
                let answer = Message::Compute(ComputeMessage::StartTimeEstimatesReply { result });
                if let Err(cause) = reply.put(answer).await {
                    tracing::debug!(%cause, "requester is gone");
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
            Message::Control(ControlMessage::HostStateChanged { .. }) => true,
            other => {
                tracing::warn!(service = %self.ctx.name, msg = other.name(), "unexpected message");
                true
            }
        }
    }
}

#[async_trait::async_trait]
impl Service for BatchComputeService {
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
        JobSupport { standard: true, pilot: true, grid: true }
    }

    async fn main(&mut self) -> u8 {
        tracing::info!(
            service = %self.ctx.name,
            hosts = self.hosts.len(),
            algorithm = %self.algorithm,
            host_selection = %self.host_selection,
            "batch compute service up"
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
            self.expire_deadlines().await;
            self.dispatch_pending().await;
        }
        0
    }
}

#[cfg(test)]
#[path = "batch_tests.rs"]
mod tests;
