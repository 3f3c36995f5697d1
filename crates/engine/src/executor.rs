// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-use action executors.
//!
//! An executor is an ephemeral task that simulates one action's resource
//! use and reports `ExecutorDone` back to its AES. Cancellation (kill,
//! host power-off, suspension) is a token: the canceller owns the
//! bookkeeping and reads compute progress from the shared
//! [`ProgressCell`], so a cancelled executor exits silently.

use crate::rpc;
use crate::simulation::Simulation;
use dr_core::{Action, ActionKind, ActionState, HostName, SimResult};
use dr_wire::{AesMessage, Endpoint, Message};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Shared view of a compute executor's progress, written by the executor
/// at work start and drained exactly once — by the canceller on
/// cancellation, or by the executor itself on completion.
#[derive(Default)]
pub struct ProgressCell(Mutex<Option<(f64, f64)>>);

impl ProgressCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that compute work started at `date` progressing at `rate`
    /// flop/s.
    pub fn start(&self, date: f64, rate: f64) {
        *self.0.lock() = Some((date, rate));
    }

    /// Flops performed since `start`, clearing the cell.
    pub fn drain(&self, now: f64) -> f64 {
        match self.0.lock().take() {
            Some((start, rate)) => ((now - start) * rate).max(0.0),
            None => 0.0,
        }
    }
}

/// Everything one executor run needs.
pub(crate) struct ExecutorSpec {
    pub action: Action,
    pub host: HostName,
    pub num_cores: usize,
    pub thread_overhead: f64,
    pub simulate_computation_as_sleep: bool,
    pub progress: Arc<ProgressCell>,
    pub cancel: CancellationToken,
    pub aes: Endpoint,
    pub sim: Simulation,
}

pub(crate) fn spawn_executor(spec: ExecutorSpec) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run_executor(spec))
}

async fn run_executor(spec: ExecutorSpec) {
    let clock = spec.sim.clock().clone();
    let cancel = spec.cancel.clone();
    let work = async {
        if spec.thread_overhead > 0.0 {
            clock.sleep(spec.thread_overhead).await;
        }
        perform(&spec).await
    };
    tokio::select! {
        result = work => {
            let now = clock.now();
            spec.action.set_end_date(now);
            match result {
                Ok(()) => {
                    spec.progress.drain(now);
                    if let ActionKind::Compute { flops } = spec.action.kind() {
                        spec.action.set_flops_done(flops);
                    }
                    spec.action.set_state(ActionState::Completed);
                }
                Err(cause) => {
                    tracing::info!(
                        action = %spec.action.name(),
                        %cause,
                        "action failed in executor"
                    );
                    spec.progress.drain(now);
                    spec.action.set_failure_cause(Some(cause));
                    spec.action.set_state(ActionState::Failed);
                }
            }
            let done = Message::Aes(AesMessage::ExecutorDone { action: spec.action.clone() });
            if let Err(cause) = spec.aes.put(done).await {
                tracing::debug!(%cause, "executor could not report back");
            }
        }
        _ = cancel.cancelled() => {
            // The canceller performs all bookkeeping.
        }
    }
}

async fn perform(spec: &ExecutorSpec) -> SimResult<()> {
    let clock = spec.sim.clock();
    match spec.action.kind() {
        ActionKind::Compute { .. } => {
            let speed = spec.sim.platform().host_speed(spec.host.as_str()).unwrap_or(0.0);
            let rate = speed * spec.num_cores as f64;
            let remaining = spec.action.remaining_flops();
            if spec.simulate_computation_as_sleep {
                tracing::trace!(action = %spec.action.name(), "computing as sleep");
            }
            if rate > 0.0 && remaining > 0.0 {
                spec.progress.start(clock.now(), rate);
                clock.sleep(remaining / rate).await;
            }
            Ok(())
        }
        ActionKind::FileRead { location, num_bytes } => {
            rpc::file_read(&spec.sim, &location, num_bytes, None).await.map(|_| ())
        }
        ActionKind::FileWrite { location } => rpc::file_write(&spec.sim, &location, None).await,
        ActionKind::FileCopy { src, dst } => rpc::file_copy(&spec.sim, &src, &dst, None).await,
        ActionKind::FileDelete { location } => rpc::file_delete(&spec.sim, &location, None).await,
        ActionKind::Sleep { seconds } => {
            clock.sleep(seconds).await;
            Ok(())
        }
        ActionKind::Custom { work } => work.run(clock).await,
    }
}
