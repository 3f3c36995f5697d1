// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The execution controller.
//!
//! A user-authored daemon driving a simulation run: it creates managers,
//! sets timers, and consumes typed lifecycle events from its commport in
//! enqueue order. `wait_for_next_event` is a finite, restartable iterator
//! over the bus.

use crate::data_manager::DataMovementManager;
use crate::handler::{dispatch, EventHandler};
use crate::job_manager::{JobManager, JobManagerDaemon};
use dr_core::{
    ExecutionEvent, FailureCause, HostName, PropertyBag, ServiceName, SimResult,
};
use dr_engine::registry::{JobSupport, RegistryEntry, ServiceKind, ServiceState};
use dr_engine::Simulation;
use dr_wire::{Commport, Endpoint, Message};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A controller: the event-bus consumer driving a simulation run.
pub struct Controller {
    sim: Simulation,
    name: ServiceName,
    host: HostName,
    commport: Commport,
    manager_seq: usize,
}

impl Controller {
    pub fn new(
        sim: &Simulation,
        name: impl Into<ServiceName>,
        host: impl Into<HostName>,
    ) -> Self {
        let name = name.into();
        let commport = sim.fabric().commport(name.as_str());
        sim.registry().register(
            name.clone(),
            RegistryEntry {
                endpoint: commport.endpoint(),
                state: ServiceState::Up,
                kind: ServiceKind::Controller,
                support: JobSupport::default(),
                scratch: None,
                kill: CancellationToken::new(),
                daemon_lock: Arc::new(Mutex::new(())),
            },
        );
        Self { sim: sim.clone(), name, host: host.into(), commport, manager_seq: 0 }
    }

    pub fn name(&self) -> &ServiceName {
        &self.name
    }

    pub fn sim(&self) -> &Simulation {
        &self.sim
    }

    /// The endpoint events are delivered to.
    pub fn event_endpoint(&self) -> Endpoint {
        self.commport.endpoint()
    }

    /// Launch a job manager daemon and return its client handle.
    pub fn create_job_manager(&mut self) -> JobManager {
        self.manager_seq += 1;
        let name = ServiceName::new(format!("{}_jm{}", self.name, self.manager_seq));
        let ctx = self.sim.service_ctx(name.clone(), self.host.clone(), PropertyBag::new());
        let daemon = JobManagerDaemon::new(ctx, self.event_endpoint());
        let endpoint = self.sim.launch(daemon, false);
        JobManager::new(self.sim.clone(), name, endpoint)
    }

    pub fn create_data_movement_manager(&mut self) -> DataMovementManager {
        DataMovementManager::new(self.sim.clone(), self.event_endpoint())
    }

    /// Fire `TimerFired{tag}` on the bus at the given simulated date.
    pub fn set_timer(&self, date: f64, tag: impl Into<String>) {
        let clock = self.sim.clock().clone();
        let endpoint = self.event_endpoint();
        let tag = tag.into();
        tokio::spawn(async move {
            clock.sleep_until(date).await;
            let event = ExecutionEvent::TimerFired { tag };
            if let Err(cause) = endpoint.put(Message::Event(Box::new(event))).await {
                tracing::debug!(%cause, "controller is gone");
            }
        });
    }

    /// Next event from the bus, in enqueue order. Non-event messages are
    /// logged and skipped; a timeout fails with `NetworkTimeout`.
    pub async fn wait_for_next_event(
        &mut self,
        timeout: Option<f64>,
    ) -> SimResult<ExecutionEvent> {
        let deadline = timeout.map(|t| self.sim.now() + t.max(0.0));
        loop {
            let remaining = match deadline {
                None => None,
                Some(d) => {
                    let left = d - self.sim.now();
                    if left <= 0.0 {
                        return Err(FailureCause::NetworkTimeout {
                            endpoint: self.name.to_string(),
                        });
                    }
                    Some(left)
                }
            };
            match self.commport.get(remaining).await? {
                Message::Event(event) => return Ok(*event),
                other => {
                    tracing::warn!(msg = other.name(), "non-event message on the controller bus");
                }
            }
        }
    }

    /// Wait for the next event and dispatch it to the handler. `Ok(false)`
    /// means the timeout elapsed with no event.
    pub async fn wait_for_and_process_next_event(
        &mut self,
        handler: &mut dyn EventHandler,
        timeout: Option<f64>,
    ) -> SimResult<bool> {
        match self.wait_for_next_event(timeout).await {
            Ok(event) => {
                dispatch(handler, event).await;
                Ok(true)
            }
            Err(FailureCause::NetworkTimeout { .. }) => Ok(false),
            Err(cause) => Err(cause),
        }
    }

    /// Push a custom event onto the bus (from user daemons or tests).
    pub fn emit_custom(&self, payload: serde_json::Value) {
        self.event_endpoint().dput(Message::Event(Box::new(ExecutionEvent::Custom { payload })));
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
