// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Action Execution Service.
//!
//! Accepts ready actions, binds each to `(host, cores, ram)`, launches a
//! single-use executor, and consumes executor completion notifications.
//! Placement combines a load heuristic with head-of-line fairness for RAM:
//! when a host fails a candidate only on RAM, the host with the most
//! available RAM is excluded for the rest of the dispatch pass so
//! small-RAM actions cannot starve a large-RAM one indefinitely.

use crate::executor::{spawn_executor, ExecutorSpec, ProgressCell};
use crate::registry::{ServiceKind, ServiceState};
use crate::service::{Service, ServiceCtx};
use crate::simulation::Simulation;
use dr_core::{
    Action, ActionState, FailureCause, HostName, SimResult, TerminationCause,
};
use dr_wire::{AesMessage, ControlMessage, Endpoint, HostResourceInfo, Message,
    ResourceInformation, RunSpec};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// `true`: exit with a crash code once every host is down and nothing
/// runs.
pub const TERMINATE_WHENEVER_ALL_RESOURCES_ARE_DOWN: &str =
    "TERMINATE_WHENEVER_ALL_RESOURCES_ARE_DOWN";
/// Seconds charged at executor start.
pub const THREAD_CREATION_OVERHEAD: &str = "THREAD_CREATION_OVERHEAD";
/// Simulate compute as a sleep of the same duration.
pub const SIMULATE_COMPUTATION_AS_SLEEP: &str = "SIMULATE_COMPUTATION_AS_SLEEP";
/// `true`: a crashed executor fails its action; `false`: the action is
/// transparently requeued.
pub const FAIL_ACTION_AFTER_EXECUTOR_CRASH: &str = "FAIL_ACTION_AFTER_ACTION_EXECUTOR_CRASH";

struct RunningAction {
    host: HostName,
    cores: usize,
    ram: u64,
    cancel: CancellationToken,
    progress: Arc<ProgressCell>,
}

/// Per-service allocator dispatching ready actions onto host cores and RAM.
pub struct ActionExecutionService {
    ctx: ServiceCtx,
    parent: Endpoint,
    /// Per-host totals this service may use (may be capped below the
    /// platform totals by the embedding service).
    compute_resources: IndexMap<HostName, (usize, u64)>,
    ram_available: HashMap<HostName, u64>,
    running_threads: HashMap<HostName, usize>,
    ready: VecDeque<Action>,
    run_specs: HashMap<Action, RunSpec>,
    running: HashMap<Action, RunningAction>,
    suspended: bool,
    fail_after_crash: bool,
    thread_overhead: f64,
    as_sleep: bool,
    terminate_when_down: bool,
    exit_code: u8,
}

impl ActionExecutionService {
    /// Build an AES over explicit per-host `(cores, ram)` totals.
    pub fn new(
        ctx: ServiceCtx,
        parent: Endpoint,
        compute_resources: IndexMap<HostName, (usize, u64)>,
    ) -> Self {
        Self {
            ctx,
            parent,
            compute_resources,
            ram_available: HashMap::new(),
            running_threads: HashMap::new(),
            ready: VecDeque::new(),
            run_specs: HashMap::new(),
            running: HashMap::new(),
            suspended: false,
            fail_after_crash: false,
            thread_overhead: 0.0,
            as_sleep: false,
            terminate_when_down: false,
            exit_code: 0,
        }
    }

    /// Per-host totals read from the platform.
    pub fn resources_from_platform(
        sim: &Simulation,
        hosts: &[HostName],
    ) -> IndexMap<HostName, (usize, u64)> {
        let platform = sim.platform();
        hosts
            .iter()
            .filter_map(|h| {
                let cores = platform.host_cores(h.as_str()).ok()?;
                let ram = platform.host_memory(h.as_str()).ok()?;
                Some((h.clone(), (cores, ram)))
            })
            .collect()
    }

    /// Rebuild ledgers from the configured totals. Called at every
    /// `main()` entry, so a restarted daemon never trusts pre-crash state.
    fn init_ledgers(&mut self) {
        self.ram_available =
            self.compute_resources.iter().map(|(h, (_, ram))| (h.clone(), *ram)).collect();
        self.running_threads =
            self.compute_resources.keys().map(|h| (h.clone(), 0)).collect();
        self.ready.clear();
        self.run_specs.clear();
        self.running.clear();
        self.suspended = false;
    }

    fn parse_properties(&mut self) {
        fn or_default<T>(service: &dr_core::ServiceName, r: Result<T, dr_core::PropertyError>, default: T) -> T {
            match r {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(service = %service, %e, "bad property value, using default");
                    default
                }
            }
        }
        let name = self.ctx.name.clone();
        let props = &self.ctx.properties;
        self.fail_after_crash =
            or_default(&name, props.get_bool(FAIL_ACTION_AFTER_EXECUTOR_CRASH, false), false);
        self.thread_overhead = or_default(&name, props.get_f64(THREAD_CREATION_OVERHEAD, 0.0), 0.0);
        self.as_sleep =
            or_default(&name, props.get_bool(SIMULATE_COMPUTATION_AS_SLEEP, false), false);
        self.terminate_when_down = or_default(
            &name,
            props.get_bool(TERMINATE_WHENEVER_ALL_RESOURCES_ARE_DOWN, false),
            false,
        );
    }

    /// Validate and enqueue one ready action.
    fn submit(&mut self, action: Action, spec: RunSpec) -> SimResult<()> {
        let service = self.ctx.name.clone();
        if action.state() != ActionState::Ready {
            return Err(FailureCause::NotAllowed {
                service,
                reason: format!("action '{}' is not ready", action.name()),
            });
        }
        if let Some(host) = &spec.host {
            if !self.compute_resources.contains_key(host.as_str()) {
                return Err(FailureCause::NotAllowed {
                    service,
                    reason: format!("unknown host '{host}' in service-specific arguments"),
                });
            }
        }
        if let Some(cores) = spec.num_cores {
            if cores < action.min_cores() || cores > action.max_cores() {
                return Err(FailureCause::NotAllowed {
                    service,
                    reason: format!(
                        "requested {cores} cores outside [{}, {}] for action '{}'",
                        action.min_cores(),
                        action.max_cores(),
                        action.name()
                    ),
                });
            }
        }
        let needed_cores = spec.num_cores.unwrap_or_else(|| action.min_cores());
        let feasible = self.compute_resources.iter().any(|(host, (cores, ram))| {
            let host_ok = spec.host.as_ref().map(|h| h == host).unwrap_or(true);
            host_ok && *cores >= needed_cores && *ram >= action.min_ram()
        });
        if !feasible {
            return Err(FailureCause::NotEnoughResources { job: action.name(), service });
        }
        tracing::debug!(service = %self.ctx.name, action = %action.name(), "action enqueued");
        self.run_specs.insert(action.clone(), spec);
        self.ready.push_back(action);
        Ok(())
    }

    /// One placement attempt for one action. On a RAM-only miss, the host
    /// with the most available RAM joins `avoid` for the rest of the pass.
    fn pick_allocation(
        &self,
        action: &Action,
        required_host: Option<&HostName>,
        required_cores: Option<usize>,
        avoid: &mut HashSet<HostName>,
    ) -> Option<(HostName, usize)> {
        let platform = self.ctx.sim().platform();
        let mut best: Option<(f64, HostName, usize)> = None;
        let mut ram_blocked: Option<(HostName, u64)> = None;

        for (host, (total_cores, _)) in &self.compute_resources {
            if required_host.is_some_and(|h| h != host) {
                continue;
            }
            if !platform.host_is_on(host.as_str()) {
                continue;
            }
            let speed = platform.host_speed(host.as_str()).unwrap_or(0.0);
            if speed <= 0.0 {
                continue;
            }
            let running = self.running_threads.get(host).copied().unwrap_or(0);
            let available_cores = total_cores.saturating_sub(running);
            if available_cores < required_cores.unwrap_or_else(|| action.min_cores()) {
                continue;
            }
            if action.min_ram() > 0 && avoid.contains(host) {
                continue;
            }
            let ram_available = self.ram_available.get(host).copied().unwrap_or(0);
            if ram_available < action.min_ram() {
                // Track the RAM-only miss with the most available RAM: it
                // is the host most likely to become usable soonest.
                match &ram_blocked {
                    Some((_, best_ram)) if *best_ram >= ram_available => {}
                    _ => ram_blocked = Some((host.clone(), ram_available)),
                }
                continue;
            }
            let cores_to_use =
                required_cores.unwrap_or_else(|| (*total_cores).min(action.max_cores()));
            let load = ((running + cores_to_use) as f64 / *total_cores as f64) / (speed / 1e9);
            // Strict less-than: ties resolve to the earliest declared host.
            if best.as_ref().map(|(l, _, _)| load < *l).unwrap_or(true) {
                best = Some((load, host.clone(), cores_to_use));
            }
        }

        if best.is_none() {
            if let Some((host, _)) = ram_blocked {
                avoid.insert(host);
            }
        }
        best.map(|(_, host, cores)| (host, cores))
    }

    /// One dispatch pass over the ready queue, FIFO. Ledger debits and
    /// executor spawns are a single synchronous critical section under the
    /// daemon lock.
    fn dispatch_ready_actions(&mut self) {
        if self.ready.is_empty() {
            return;
        }
        let daemon_lock = self.ctx.daemon_lock();
        let _guard = daemon_lock.lock();

        let mut avoid: HashSet<HostName> = HashSet::new();
        let mut dispatched: Vec<Action> = Vec::new();
        let now = self.ctx.now();

        let queue: Vec<Action> = self.ready.iter().cloned().collect();
        for action in queue {
            let spec = self.run_specs.get(&action).cloned().unwrap_or_default();
            let Some((host, cores)) =
                self.pick_allocation(&action, spec.host.as_ref(), spec.num_cores, &mut avoid)
            else {
                continue;
            };
            let ram = action.min_ram();
            if let Some(avail) = self.ram_available.get_mut(&host) {
                *avail -= ram;
            }
            if let Some(threads) = self.running_threads.get_mut(&host) {
                *threads += cores;
            }
            debug_assert!(
                self.running_threads.get(&host).copied().unwrap_or(0)
                    <= self.compute_resources.get(&host).map(|(c, _)| *c).unwrap_or(0)
            );

            action.set_state(ActionState::Started);
            if action.start_date().is_none() {
                action.set_start_date(now);
            }
            let progress = Arc::new(ProgressCell::new());
            let cancel = self.ctx.kill_token().child_token();
            tracing::info!(
                service = %self.ctx.name,
                action = %action.name(),
                host = %host,
                cores,
                ram,
                "action dispatched"
            );
            spawn_executor(ExecutorSpec {
                action: action.clone(),
                host: host.clone(),
                num_cores: cores,
                thread_overhead: self.thread_overhead,
                simulate_computation_as_sleep: self.as_sleep,
                progress: Arc::clone(&progress),
                cancel: cancel.clone(),
                aes: self.ctx.endpoint(),
                sim: self.ctx.sim().clone(),
            });
            self.running.insert(action.clone(), RunningAction { host, cores, ram, cancel, progress });
            dispatched.push(action);
        }
        self.ready.retain(|a| !dispatched.contains(a));
    }

    fn release(&mut self, run: &RunningAction) {
        if let Some(avail) = self.ram_available.get_mut(&run.host) {
            *avail += run.ram;
            debug_assert!(
                *avail <= self.compute_resources.get(&run.host).map(|(_, r)| *r).unwrap_or(0)
            );
        }
        if let Some(threads) = self.running_threads.get_mut(&run.host) {
            *threads = threads.saturating_sub(run.cores);
        }
    }

    async fn handle_executor_done(&mut self, action: Action) {
        let Some(run) = self.running.remove(&action) else {
            // Already terminated; the late notification is stale.
            return;
        };
        self.release(&run);
        self.run_specs.remove(&action);
        tracing::info!(
            service = %self.ctx.name,
            action = %action.name(),
            state = %action.state(),
            "action finished"
        );
        let done = Message::Aes(AesMessage::ActionDone { action });
        if let Err(cause) = self.parent.put(done).await {
            tracing::debug!(%cause, "parent is gone, dropping action notification");
        }
    }

    /// Crash every executor on a host that turned off, applying the retry
    /// policy. Returns `false` when the service should terminate (all
    /// hosts down with nothing running under the termination property).
    async fn handle_host_state(&mut self, host: &HostName, on: bool) -> bool {
        if on {
            // Just wake up: the dispatch pass after this message may now
            // place work again.
            return true;
        }
        let victims: Vec<Action> = self
            .running
            .iter()
            .filter(|(_, run)| &run.host == host)
            .map(|(action, _)| action.clone())
            .collect();
        let now = self.ctx.now();
        for action in victims {
            let Some(run) = self.running.remove(&action) else { continue };
            run.cancel.cancel();
            let done = run.progress.drain(now);
            action.set_flops_done(action.flops_done() + done);
            self.release(&run);
            if self.fail_after_crash {
                action.set_failure_cause(Some(FailureCause::ServiceIsDown {
                    service: self.ctx.name.clone(),
                }));
                action.set_state(ActionState::Failed);
                action.set_end_date(now);
                self.run_specs.remove(&action);
                let done = Message::Aes(AesMessage::ActionDone { action });
                if let Err(cause) = self.parent.put(done).await {
                    tracing::debug!(%cause, "parent is gone");
                }
            } else {
                tracing::info!(
                    service = %self.ctx.name,
                    action = %action.name(),
                    host = %host,
                    "executor crashed, requeueing action"
                );
                action.set_failure_cause(None);
                action.set_state(ActionState::Ready);
                self.ready.push_back(action);
            }
        }
        if self.terminate_when_down && self.running.is_empty() {
            let platform = self.ctx.sim().platform();
            let all_down =
                self.compute_resources.keys().all(|h| !platform.host_is_on(h.as_str()));
            if all_down {
                tracing::warn!(service = %self.ctx.name, "all compute resources down, exiting");
                self.exit_code = 1;
                return false;
            }
        }
        true
    }

    /// Remove one action from this service, killing its executor if it is
    /// running. `notify_parent` is false when the parent itself asked.
    async fn terminate_action(
        &mut self,
        action: &Action,
        cause: TerminationCause,
        notify_parent: bool,
    ) -> SimResult<()> {
        let in_ready = self.ready.contains(action);
        let in_running = self.running.contains_key(action);
        if !in_ready && !in_running {
            return Err(FailureCause::NotAllowed {
                service: self.ctx.name.clone(),
                reason: format!("unknown action '{}'", action.name()),
            });
        }
        let now = self.ctx.now();
        if in_ready {
            self.ready.retain(|a| a != action);
        }
        if let Some(run) = self.running.remove(action) {
            run.cancel.cancel();
            let done = run.progress.drain(now);
            action.set_flops_done(action.flops_done() + done);
            self.release(&run);
        }
        self.run_specs.remove(action);
        let job = action.job().unwrap_or_else(|| action.name());
        action.set_failure_cause(Some(cause.to_failure(&self.ctx.name, &job)));
        action.set_state(ActionState::Killed);
        action.set_end_date(now);
        tracing::info!(
            service = %self.ctx.name,
            action = %action.name(),
            %cause,
            "action terminated"
        );
        if notify_parent {
            let done = Message::Aes(AesMessage::ActionDone { action: action.clone() });
            if let Err(cause) = self.parent.put(done).await {
                tracing::debug!(%cause, "parent is gone");
            }
        }
        Ok(())
    }

    /// Graceful stop: kill everything with the cause-derived per-action
    /// failure, notifying the parent per `notify_pending`.
    async fn stop_all(&mut self, notify_pending: bool, cause: TerminationCause) {
        let pending: Vec<Action> = self
            .running
            .keys()
            .cloned()
            .chain(self.ready.iter().cloned())
            .collect();
        for action in pending {
            let _ = self.terminate_action(&action, cause, notify_pending).await;
        }
    }

    /// Freeze all executors, preserving compute progress. Resources stay
    /// allocated; the actions remain `Started`.
    fn suspend(&mut self) {
        if self.suspended {
            return;
        }
        let now = self.ctx.now();
        for (action, run) in self.running.iter_mut() {
            run.cancel.cancel();
            let done = run.progress.drain(now);
            action.set_flops_done(action.flops_done() + done);
        }
        self.suspended = true;
        self.ctx.sim().registry().set_state(self.ctx.name.as_str(), ServiceState::Suspended);
        tracing::info!(service = %self.ctx.name, frozen = self.running.len(), "service suspended");
    }

    /// Restart one executor per frozen action with its remaining work.
    fn resume(&mut self) {
        if !self.suspended {
            return;
        }
        for (action, run) in self.running.iter_mut() {
            let cancel = self.ctx.kill_token().child_token();
            let progress = Arc::new(ProgressCell::new());
            run.cancel = cancel.clone();
            run.progress = Arc::clone(&progress);
            spawn_executor(ExecutorSpec {
                action: action.clone(),
                host: run.host.clone(),
                num_cores: run.cores,
                thread_overhead: 0.0,
                simulate_computation_as_sleep: self.as_sleep,
                progress,
                cancel,
                aes: self.ctx.commport.endpoint(),
                sim: self.ctx.sim().clone(),
            });
        }
        self.suspended = false;
        self.ctx.sim().registry().set_state(self.ctx.name.as_str(), ServiceState::Up);
        tracing::info!(service = %self.ctx.name, resumed = self.running.len(), "service resumed");
    }

    fn resource_information(&self) -> ResourceInformation {
        let platform = self.ctx.sim().platform();
        ResourceInformation {
            hosts: self
                .compute_resources
                .iter()
                .map(|(host, (cores, ram))| HostResourceInfo {
                    host: host.clone(),
                    total_cores: *cores,
                    idle_cores: cores
                        .saturating_sub(self.running_threads.get(host).copied().unwrap_or(0)),
                    total_ram: *ram,
                    ram_available: self.ram_available.get(host).copied().unwrap_or(*ram),
                    speed: platform.host_speed(host.as_str()).unwrap_or(0.0),
                    on: platform.host_is_on(host.as_str()),
                })
                .collect(),
        }
    }

    /// Handle one message; `false` ends the daemon loop.
    async fn handle_message(&mut self, msg: Message) -> bool {
        match msg {
            Message::Aes(AesMessage::SubmitAction { action, spec, reply }) => {
                let result = self.submit(action, spec);
                let answer = Message::Aes(AesMessage::SubmitActionReply { result });
                if let Err(cause) = reply.put(answer).await {
                    tracing::debug!(%cause, "submitter is gone");
                }
                true
            }
            Message::Aes(AesMessage::TerminateAction { action, cause, reply }) => {
                let result = self.terminate_action(&action, cause, false).await;
                let answer = Message::Aes(AesMessage::TerminateActionReply { result });
                if let Err(cause) = reply.put(answer).await {
                    tracing::debug!(%cause, "terminator is gone");
                }
                true
            }
            Message::Aes(AesMessage::ExecutorDone { action }) => {
                self.handle_executor_done(action).await;
                true
            }
            Message::Aes(AesMessage::ResourceInfo { reply }) => {
                let info = self.resource_information();
                let answer = Message::Aes(AesMessage::ResourceInfoReply { info });
                if let Err(cause) = reply.put(answer).await {
                    tracing::debug!(%cause, "requester is gone");
                }
                true
            }
            Message::Control(ControlMessage::Stop { notify_pending, cause, reply }) => {
                self.stop_all(notify_pending, cause).await;
                let answer =
                    Message::Control(ControlMessage::Stopped { service: self.ctx.name.clone() });
                if let Err(cause) = reply.put(answer).await {
                    tracing::debug!(%cause, "stopper is gone");
                }
                false
            }
            Message::Control(ControlMessage::Suspend { reply }) => {
                self.suspend();
                let answer =
                    Message::Control(ControlMessage::Suspended { service: self.ctx.name.clone() });
                if let Err(cause) = reply.put(answer).await {
                    tracing::debug!(%cause, "suspender is gone");
                }
                true
            }
            Message::Control(ControlMessage::Resume { reply }) => {
                self.resume();
                let answer =
                    Message::Control(ControlMessage::Resumed { service: self.ctx.name.clone() });
                if let Err(cause) = reply.put(answer).await {
                    tracing::debug!(%cause, "resumer is gone");
                }
                true
            }
            Message::Control(ControlMessage::HostStateChanged { host, on }) => {
                self.handle_host_state(&host, on).await
            }
            other => {
                tracing::warn!(service = %self.ctx.name, msg = other.name(), "unexpected message");
                true
            }
        }
    }
}

#[async_trait::async_trait]
impl Service for ActionExecutionService {
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
        self.init_ledgers();
        self.parse_properties();
        self.exit_code = 0;
        self.ctx.sim().platform().subscribe(self.ctx.endpoint());
        tracing::info!(
            service = %self.ctx.name,
            hosts = self.compute_resources.len(),
            "action execution service up"
        );
        loop {
            let msg = match self.ctx.commport.get(None).await {
                Ok(msg) => msg,
                Err(_) => break,
            };
            if !self.handle_message(msg).await {
                break;
            }
            if !self.suspended {
                self.dispatch_ready_actions();
            }
        }
        self.exit_code
    }
}

/// Submit one ready action to an AES and await the synchronous answer.
pub async fn submit_action(
    sim: &Simulation,
    aes: &Endpoint,
    action: &Action,
    spec: RunSpec,
) -> SimResult<()> {
    let reply = dr_wire::request(sim.fabric(), aes, None, |reply| {
        Message::Aes(AesMessage::SubmitAction { action: action.clone(), spec, reply })
    })
    .await?;
    match reply {
        Message::Aes(AesMessage::SubmitActionReply { result }) => result,
        _ => Err(dr_wire::protocol_error(aes.name())),
    }
}

/// Ask an AES to terminate an action. The AES does not notify its parent
/// for caller-initiated terminations.
pub async fn terminate_action(
    sim: &Simulation,
    aes: &Endpoint,
    action: &Action,
    cause: TerminationCause,
) -> SimResult<()> {
    let reply = dr_wire::request(sim.fabric(), aes, None, |reply| {
        Message::Aes(AesMessage::TerminateAction { action: action.clone(), cause, reply })
    })
    .await?;
    match reply {
        Message::Aes(AesMessage::TerminateActionReply { result }) => result,
        _ => Err(dr_wire::protocol_error(aes.name())),
    }
}

/// Snapshot an AES's per-host resource state.
pub async fn resource_information(sim: &Simulation, aes: &Endpoint) -> SimResult<ResourceInformation> {
    let reply = dr_wire::request(sim.fabric(), aes, None, |reply| {
        Message::Aes(AesMessage::ResourceInfo { reply })
    })
    .await?;
    match reply {
        Message::Aes(AesMessage::ResourceInfoReply { info }) => Ok(info),
        _ => Err(dr_wire::protocol_error(aes.name())),
    }
}

#[cfg(test)]
#[path = "aes_tests.rs"]
mod tests;
