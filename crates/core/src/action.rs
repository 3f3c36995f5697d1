// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Actions: the smallest units of simulated work.
//!
//! An [`Action`] is a shared handle; the submitting controller, the owning
//! job, the hosting compute service and the ephemeral executor all observe
//! the same state. States advance monotonically, with one exception: a
//! crashed executor may put a `Ready`/`Started` action back to `Ready` when
//! the owning service retries transparently.

use crate::clock::SimClock;
use crate::data::FileLocation;
use crate::failure::{FailureCause, SimResult};
use crate::job::JobError;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Lifecycle state of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionState {
    NotReady,
    Ready,
    Started,
    Completed,
    Killed,
    Failed,
}

impl ActionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ActionState::Completed | ActionState::Killed | ActionState::Failed)
    }
}

crate::simple_display! {
    ActionState {
        NotReady => "not_ready",
        Ready => "ready",
        Started => "started",
        Completed => "completed",
        Killed => "killed",
        Failed => "failed",
    }
}

/// User-supplied work for a custom action. Runs inside the action executor
/// and may consume simulated time through the clock.
#[async_trait::async_trait]
pub trait CustomWork: Send + Sync {
    async fn run(&self, clock: &SimClock) -> SimResult<()>;
}

/// What an action does, with its per-variant payload.
#[derive(Clone)]
pub enum ActionKind {
    Compute { flops: f64 },
    FileRead { location: FileLocation, num_bytes: Option<u64> },
    FileWrite { location: FileLocation },
    FileCopy { src: FileLocation, dst: FileLocation },
    FileDelete { location: FileLocation },
    Sleep { seconds: f64 },
    Custom { work: Arc<dyn CustomWork> },
}

impl ActionKind {
    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::Compute { .. } => "compute",
            ActionKind::FileRead { .. } => "file_read",
            ActionKind::FileWrite { .. } => "file_write",
            ActionKind::FileCopy { .. } => "file_copy",
            ActionKind::FileDelete { .. } => "file_delete",
            ActionKind::Sleep { .. } => "sleep",
            ActionKind::Custom { .. } => "custom",
        }
    }
}

impl fmt::Debug for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Compute { flops } => write!(f, "Compute({flops} flops)"),
            ActionKind::FileRead { location, num_bytes } => {
                write!(f, "FileRead({location}, {num_bytes:?})")
            }
            ActionKind::FileWrite { location } => write!(f, "FileWrite({location})"),
            ActionKind::FileCopy { src, dst } => write!(f, "FileCopy({src} -> {dst})"),
            ActionKind::FileDelete { location } => write!(f, "FileDelete({location})"),
            ActionKind::Sleep { seconds } => write!(f, "Sleep({seconds}s)"),
            ActionKind::Custom { .. } => write!(f, "Custom"),
        }
    }
}

struct ActionInner {
    name: String,
    job: Option<String>,
    kind: ActionKind,
    min_cores: usize,
    max_cores: usize,
    min_ram: u64,
    state: ActionState,
    failure: Option<FailureCause>,
    start_date: Option<f64>,
    end_date: Option<f64>,
    parents: Vec<Action>,
    /// Compute progress, preserved across suspension and executor restarts.
    flops_done: f64,
}

/// Shared handle to one action. Equality and hashing are by identity, not
/// by value: two handles are equal iff they point at the same action.
#[derive(Clone)]
pub struct Action(Arc<Mutex<ActionInner>>);

impl Action {
    /// Create a standalone action. Most actions are created through
    /// [`CompoundJob`](crate::job::CompoundJob) instead.
    pub fn new(
        name: impl Into<String>,
        kind: ActionKind,
        min_cores: usize,
        max_cores: usize,
        min_ram: u64,
    ) -> Result<Self, JobError> {
        let name = name.into();
        if min_cores < 1 || min_cores > max_cores {
            return Err(JobError::InvalidCoreRange { name, min: min_cores, max: max_cores });
        }
        Ok(Self(Arc::new(Mutex::new(ActionInner {
            name,
            job: None,
            kind,
            min_cores,
            max_cores,
            min_ram,
            state: ActionState::NotReady,
            failure: None,
            start_date: None,
            end_date: None,
            parents: Vec::new(),
            flops_done: 0.0,
        }))))
    }

    pub fn name(&self) -> String {
        self.0.lock().name.clone()
    }

    /// Name of the owning job, if the action belongs to one.
    pub fn job(&self) -> Option<String> {
        self.0.lock().job.clone()
    }

    pub(crate) fn set_job(&self, job: &str) {
        self.0.lock().job = Some(job.to_string());
    }

    pub fn kind(&self) -> ActionKind {
        self.0.lock().kind.clone()
    }

    pub fn min_cores(&self) -> usize {
        self.0.lock().min_cores
    }

    pub fn max_cores(&self) -> usize {
        self.0.lock().max_cores
    }

    pub fn min_ram(&self) -> u64 {
        self.0.lock().min_ram
    }

    pub fn state(&self) -> ActionState {
        self.0.lock().state
    }

    /// Set the state. Used by the execution services; user code should
    /// treat action state as read-only.
    pub fn set_state(&self, state: ActionState) {
        self.0.lock().state = state;
    }

    pub fn failure_cause(&self) -> Option<FailureCause> {
        self.0.lock().failure.clone()
    }

    pub fn set_failure_cause(&self, cause: Option<FailureCause>) {
        self.0.lock().failure = cause;
    }

    pub fn start_date(&self) -> Option<f64> {
        self.0.lock().start_date
    }

    pub fn set_start_date(&self, date: f64) {
        self.0.lock().start_date = Some(date);
    }

    pub fn end_date(&self) -> Option<f64> {
        self.0.lock().end_date
    }

    pub fn set_end_date(&self, date: f64) {
        self.0.lock().end_date = Some(date);
    }

    pub fn parents(&self) -> Vec<Action> {
        self.0.lock().parents.clone()
    }

    pub(crate) fn add_parent(&self, parent: Action) {
        self.0.lock().parents.push(parent);
    }

    /// All parents completed and the action itself has not started.
    pub fn ready_to_run(&self) -> bool {
        if self.state() != ActionState::NotReady {
            return false;
        }
        self.parents().iter().all(|p| p.state() == ActionState::Completed)
    }

    /// Compute flops already performed (preserved across suspensions).
    pub fn flops_done(&self) -> f64 {
        self.0.lock().flops_done
    }

    pub fn set_flops_done(&self, flops: f64) {
        self.0.lock().flops_done = flops;
    }

    /// Remaining compute work; zero for non-compute actions.
    pub fn remaining_flops(&self) -> f64 {
        let inner = self.0.lock();
        match inner.kind {
            ActionKind::Compute { flops } => (flops - inner.flops_done).max(0.0),
            _ => 0.0,
        }
    }

    /// Reset a non-terminal or cancelled action so it can run again after a
    /// service-down cascade (the job may be resubmitted elsewhere).
    pub fn reset_for_rerun(&self) {
        let ready = self.parents().iter().all(|p| p.state() == ActionState::Completed);
        let mut inner = self.0.lock();
        inner.state = if ready { ActionState::Ready } else { ActionState::NotReady };
        inner.failure = None;
        inner.end_date = None;
    }
}

impl PartialEq for Action {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Action {}

impl std::hash::Hash for Action {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.0.lock();
        write!(f, "Action({} [{}] {})", inner.name, inner.kind.label(), inner.state)
    }
}

#[cfg(test)]
#[path = "action_tests.rs"]
mod tests;
