// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Jobs: DAGs of actions submitted as a unit.
//!
//! Three shapes share a lifecycle: [`CompoundJob`] is a bare DAG,
//! [`StandardJob`] wraps a compound with task specs and file placements
//! (the hosting compute service injects the staging/compute/cleanup
//! actions at submit time), and [`PilotJob`] is a resource reservation
//! whose body runs on the nested service the reservation grants.

use crate::action::{Action, ActionKind, ActionState, CustomWork};
use crate::data::{DataFile, FileLocation};
use crate::failure::FailureCause;
use crate::names::ServiceName;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Service-specific job arguments (`-N`, `-c`, `-t`, `universe`, ...).
pub type ServiceJobArgs = HashMap<String, String>;

/// Errors building or mutating a job DAG. These are usage errors, distinct
/// from the simulation's [`FailureCause`] taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    #[error("action '{0}' already exists in this job")]
    DuplicateAction(String),
    #[error("action '{0}' does not belong to this job")]
    ForeignAction(String),
    #[error("dependency '{parent}' -> '{child}' would create a cycle")]
    DependencyCycle { parent: String, child: String },
    #[error("action '{0}' cannot depend on itself")]
    SelfDependency(String),
    #[error("invalid core range [{min}, {max}] for action '{name}'")]
    InvalidCoreRange { name: String, min: usize, max: usize },
    #[error("task '{0}' declared twice in standard job")]
    DuplicateTask(String),
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    NotSubmitted,
    Pending,
    Running,
    Completed,
    Failed,
    Terminated,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Terminated)
    }
}

crate::simple_display! {
    JobState {
        NotSubmitted => "not_submitted",
        Pending => "pending",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Terminated => "terminated",
    }
}

struct CompoundJobInner {
    name: String,
    priority: i64,
    state: JobState,
    actions: IndexMap<String, Action>,
    service: Option<ServiceName>,
    submit_date: Option<f64>,
    end_date: Option<f64>,
}

/// Shared handle to a DAG of actions. Equality is by identity.
#[derive(Clone)]
pub struct CompoundJob(Arc<Mutex<CompoundJobInner>>);

impl CompoundJob {
    pub fn new(name: impl Into<String>) -> Self {
        Self(Arc::new(Mutex::new(CompoundJobInner {
            name: name.into(),
            priority: 0,
            state: JobState::NotSubmitted,
            actions: IndexMap::new(),
            service: None,
            submit_date: None,
            end_date: None,
        })))
    }

    pub fn name(&self) -> String {
        self.0.lock().name.clone()
    }

    pub fn priority(&self) -> i64 {
        self.0.lock().priority
    }

    pub fn set_priority(&self, priority: i64) {
        self.0.lock().priority = priority;
    }

    pub fn state(&self) -> JobState {
        self.0.lock().state
    }

    pub fn set_state(&self, state: JobState) {
        self.0.lock().state = state;
    }

    /// Service currently hosting the job, set at submit time.
    pub fn service(&self) -> Option<ServiceName> {
        self.0.lock().service.clone()
    }

    pub fn set_service(&self, service: Option<ServiceName>) {
        self.0.lock().service = service;
    }

    pub fn submit_date(&self) -> Option<f64> {
        self.0.lock().submit_date
    }

    pub fn set_submit_date(&self, date: f64) {
        self.0.lock().submit_date = Some(date);
    }

    pub fn end_date(&self) -> Option<f64> {
        self.0.lock().end_date
    }

    pub fn set_end_date(&self, date: f64) {
        self.0.lock().end_date = Some(date);
    }

    pub fn add_compute_action(
        &self,
        name: impl Into<String>,
        flops: f64,
        min_cores: usize,
        max_cores: usize,
        min_ram: u64,
    ) -> Result<Action, JobError> {
        self.add_action(name, ActionKind::Compute { flops }, min_cores, max_cores, min_ram)
    }

    pub fn add_file_read_action(
        &self,
        name: impl Into<String>,
        location: FileLocation,
    ) -> Result<Action, JobError> {
        self.add_action(name, ActionKind::FileRead { location, num_bytes: None }, 1, 1, 0)
    }

    pub fn add_file_write_action(
        &self,
        name: impl Into<String>,
        location: FileLocation,
    ) -> Result<Action, JobError> {
        self.add_action(name, ActionKind::FileWrite { location }, 1, 1, 0)
    }

    pub fn add_file_copy_action(
        &self,
        name: impl Into<String>,
        src: FileLocation,
        dst: FileLocation,
    ) -> Result<Action, JobError> {
        self.add_action(name, ActionKind::FileCopy { src, dst }, 1, 1, 0)
    }

    pub fn add_file_delete_action(
        &self,
        name: impl Into<String>,
        location: FileLocation,
    ) -> Result<Action, JobError> {
        self.add_action(name, ActionKind::FileDelete { location }, 1, 1, 0)
    }

    pub fn add_sleep_action(
        &self,
        name: impl Into<String>,
        seconds: f64,
    ) -> Result<Action, JobError> {
        self.add_action(name, ActionKind::Sleep { seconds }, 1, 1, 0)
    }

    pub fn add_custom_action(
        &self,
        name: impl Into<String>,
        work: Arc<dyn CustomWork>,
        min_cores: usize,
        max_cores: usize,
        min_ram: u64,
    ) -> Result<Action, JobError> {
        self.add_action(name, ActionKind::Custom { work }, min_cores, max_cores, min_ram)
    }

    fn add_action(
        &self,
        name: impl Into<String>,
        kind: ActionKind,
        min_cores: usize,
        max_cores: usize,
        min_ram: u64,
    ) -> Result<Action, JobError> {
        let name = name.into();
        let mut inner = self.0.lock();
        if inner.actions.contains_key(&name) {
            return Err(JobError::DuplicateAction(name));
        }
        let action = Action::new(name.clone(), kind, min_cores, max_cores, min_ram)?;
        action.set_job(&inner.name);
        inner.actions.insert(name, action.clone());
        Ok(action)
    }

    /// Make `child` depend on `parent`. Fails on self-loops, actions from
    /// other jobs, and edges that would close a cycle.
    pub fn add_dependency(&self, parent: &Action, child: &Action) -> Result<(), JobError> {
        if parent == child {
            return Err(JobError::SelfDependency(parent.name()));
        }
        {
            let inner = self.0.lock();
            for action in [parent, child] {
                let member = inner.actions.get(&action.name()).is_some_and(|a| a == action);
                if !member {
                    return Err(JobError::ForeignAction(action.name()));
                }
            }
        }
        // A cycle would exist iff parent already (transitively) depends on
        // child.
        let mut stack = vec![parent.clone()];
        while let Some(a) = stack.pop() {
            if &a == child {
                return Err(JobError::DependencyCycle {
                    parent: parent.name(),
                    child: child.name(),
                });
            }
            stack.extend(a.parents());
        }
        child.add_parent(parent.clone());
        Ok(())
    }

    pub fn actions(&self) -> Vec<Action> {
        self.0.lock().actions.values().cloned().collect()
    }

    pub fn action(&self, name: &str) -> Option<Action> {
        self.0.lock().actions.get(name).cloned()
    }

    pub fn action_count(&self) -> usize {
        self.0.lock().actions.len()
    }

    /// Promote every `NotReady` action whose parents are all completed to
    /// `Ready` and return the newly-ready set, in insertion order.
    pub fn mark_ready_actions(&self) -> Vec<Action> {
        let actions = self.actions();
        let mut ready = Vec::new();
        for action in actions {
            if action.ready_to_run() {
                action.set_state(ActionState::Ready);
                ready.push(action);
            }
        }
        ready
    }

    /// True when every action completed.
    pub fn completed(&self) -> bool {
        self.actions().iter().all(|a| a.state() == ActionState::Completed)
    }

    /// True when every action reached a terminal state.
    pub fn all_terminal(&self) -> bool {
        self.actions().iter().all(|a| a.state().is_terminal())
    }

    /// First failed or killed action with its cause, in insertion order.
    pub fn first_failure(&self) -> Option<(Action, FailureCause)> {
        for action in self.actions() {
            let state = action.state();
            if state == ActionState::Failed || state == ActionState::Killed {
                let cause = action.failure_cause().unwrap_or(FailureCause::JobKilled {
                    job: self.name(),
                });
                return Some((action, cause));
            }
        }
        None
    }

    /// Reset every non-completed action so the job can be resubmitted after
    /// a service-down cascade.
    pub fn reset_unfinished_actions(&self) {
        for action in self.actions() {
            if action.state() != ActionState::Completed {
                action.reset_for_rerun();
            }
        }
    }
}

impl PartialEq for CompoundJob {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for CompoundJob {}

impl std::hash::Hash for CompoundJob {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl fmt::Debug for CompoundJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.0.lock();
        write!(f, "CompoundJob({} {} actions, {})", inner.name, inner.actions.len(), inner.state)
    }
}

/// One computational task of a standard job.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub name: String,
    pub flops: f64,
    pub min_cores: usize,
    pub max_cores: usize,
    pub ram: u64,
    pub inputs: Vec<DataFile>,
    pub outputs: Vec<DataFile>,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>, flops: f64) -> Self {
        Self {
            name: name.into(),
            flops,
            min_cores: 1,
            max_cores: 1,
            ram: 0,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn cores(mut self, min: usize, max: usize) -> Self {
        self.min_cores = min;
        self.max_cores = max;
        self
    }

    pub fn ram(mut self, bytes: u64) -> Self {
        self.ram = bytes;
        self
    }

    pub fn input(mut self, file: DataFile) -> Self {
        self.inputs.push(file);
        self
    }

    pub fn output(mut self, file: DataFile) -> Self {
        self.outputs.push(file);
        self
    }
}

struct StandardJobInner {
    compound: CompoundJob,
    tasks: Vec<TaskSpec>,
    placements: HashMap<DataFile, FileLocation>,
    pre_copies: Vec<(FileLocation, FileLocation)>,
    post_deletes: Vec<FileLocation>,
}

/// A compound job with an injected staging/compute/cleanup shape. The
/// hosting compute service performs the decomposition at submit time.
#[derive(Clone)]
pub struct StandardJob(Arc<Mutex<StandardJobInner>>);

impl StandardJob {
    pub fn new(
        name: impl Into<String>,
        tasks: Vec<TaskSpec>,
        placements: HashMap<DataFile, FileLocation>,
    ) -> Result<Self, JobError> {
        let mut seen = std::collections::HashSet::new();
        for task in &tasks {
            if !seen.insert(task.name.clone()) {
                return Err(JobError::DuplicateTask(task.name.clone()));
            }
        }
        Ok(Self(Arc::new(Mutex::new(StandardJobInner {
            compound: CompoundJob::new(name),
            tasks,
            placements,
            pre_copies: Vec::new(),
            post_deletes: Vec::new(),
        }))))
    }

    pub fn name(&self) -> String {
        self.0.lock().compound.name()
    }

    pub fn state(&self) -> JobState {
        self.0.lock().compound.state()
    }

    pub fn set_state(&self, state: JobState) {
        self.0.lock().compound.set_state(state);
    }

    pub fn service(&self) -> Option<ServiceName> {
        self.0.lock().compound.service()
    }

    /// The underlying action DAG. Empty until the hosting service
    /// decomposes the job.
    pub fn compound(&self) -> CompoundJob {
        self.0.lock().compound.clone()
    }

    pub fn tasks(&self) -> Vec<TaskSpec> {
        self.0.lock().tasks.clone()
    }

    pub fn placement(&self, file: &DataFile) -> Option<FileLocation> {
        self.0.lock().placements.get(file).cloned()
    }

    pub fn placements(&self) -> HashMap<DataFile, FileLocation> {
        self.0.lock().placements.clone()
    }

    /// Declare an explicit file copy to run before any task starts.
    pub fn add_pre_copy(&self, src: FileLocation, dst: FileLocation) {
        self.0.lock().pre_copies.push((src, dst));
    }

    /// Declare a file to delete after every task finished.
    pub fn add_post_delete(&self, location: FileLocation) {
        self.0.lock().post_deletes.push(location);
    }

    pub fn pre_copies(&self) -> Vec<(FileLocation, FileLocation)> {
        self.0.lock().pre_copies.clone()
    }

    pub fn post_deletes(&self) -> Vec<FileLocation> {
        self.0.lock().post_deletes.clone()
    }
}

impl PartialEq for StandardJob {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for StandardJob {}

impl fmt::Debug for StandardJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.0.lock();
        write!(f, "StandardJob({} {} tasks)", inner.compound.name(), inner.tasks.len())
    }
}

/// The body a pilot runs once its reservation is granted.
#[derive(Debug, Clone)]
pub enum JobBody {
    Standard(StandardJob),
    Compound(CompoundJob),
}

impl JobBody {
    pub fn name(&self) -> String {
        match self {
            JobBody::Standard(j) => j.name(),
            JobBody::Compound(j) => j.name(),
        }
    }
}

struct PilotJobInner {
    name: String,
    state: JobState,
    body: Option<JobBody>,
    /// The nested compute service granted to the pilot, once started.
    compute_service: Option<ServiceName>,
}

/// A resource reservation that accepts work until it expires.
#[derive(Clone)]
pub struct PilotJob(Arc<Mutex<PilotJobInner>>);

impl PilotJob {
    pub fn new(name: impl Into<String>) -> Self {
        Self(Arc::new(Mutex::new(PilotJobInner {
            name: name.into(),
            state: JobState::NotSubmitted,
            body: None,
            compute_service: None,
        })))
    }

    pub fn with_body(name: impl Into<String>, body: JobBody) -> Self {
        let pilot = Self::new(name);
        pilot.0.lock().body = Some(body);
        pilot
    }

    pub fn name(&self) -> String {
        self.0.lock().name.clone()
    }

    pub fn state(&self) -> JobState {
        self.0.lock().state
    }

    pub fn set_state(&self, state: JobState) {
        self.0.lock().state = state;
    }

    pub fn body(&self) -> Option<JobBody> {
        self.0.lock().body.clone()
    }

    /// The nested compute service backing the reservation, available after
    /// the pilot started.
    pub fn compute_service(&self) -> Option<ServiceName> {
        self.0.lock().compute_service.clone()
    }

    pub fn set_compute_service(&self, service: Option<ServiceName>) {
        self.0.lock().compute_service = service;
    }
}

impl PartialEq for PilotJob {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for PilotJob {}

impl fmt::Debug for PilotJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.0.lock();
        write!(f, "PilotJob({} {})", inner.name, inner.state)
    }
}

/// Any job, as carried in submit/terminate/notify messages.
#[derive(Debug, Clone, PartialEq)]
pub enum JobPayload {
    Standard(StandardJob),
    Compound(CompoundJob),
    Pilot(PilotJob),
}

impl JobPayload {
    pub fn name(&self) -> String {
        match self {
            JobPayload::Standard(j) => j.name(),
            JobPayload::Compound(j) => j.name(),
            JobPayload::Pilot(j) => j.name(),
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            JobPayload::Standard(_) => "standard",
            JobPayload::Compound(_) => "compound",
            JobPayload::Pilot(_) => "pilot",
        }
    }

    pub fn state(&self) -> JobState {
        match self {
            JobPayload::Standard(j) => j.state(),
            JobPayload::Compound(j) => j.state(),
            JobPayload::Pilot(j) => j.state(),
        }
    }

    pub fn set_state(&self, state: JobState) {
        match self {
            JobPayload::Standard(j) => j.set_state(state),
            JobPayload::Compound(j) => j.set_state(state),
            JobPayload::Pilot(j) => j.set_state(state),
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
