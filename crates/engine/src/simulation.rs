// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The simulation harness.
//!
//! Wires the platform, clock, fabric, and registry together and launches
//! service daemons as tokio tasks. Runs on a current-thread runtime with a
//! paused clock: when every task is idle the clock jumps to the next
//! timer, which is the discrete-event step.

use crate::registry::{RegistryEntry, ServiceRegistry, ServiceState};
use crate::service::{Service, ServiceCtx};
use dr_core::{
    FailureCause, HostName, PropertyBag, ServiceName, SimClock, SimResult, TerminationCause,
};
use dr_platform::Platform;
use dr_wire::{request, ControlMessage, Endpoint, Fabric, Message, DEFAULT_RPC_TIMEOUT};
use std::future::Future;
use std::sync::Arc;

struct SimInner {
    clock: SimClock,
    platform: Arc<Platform>,
    registry: Arc<ServiceRegistry>,
    fabric: Fabric,
}

/// Cheap-to-clone handle to one simulation run.
#[derive(Clone)]
pub struct Simulation {
    inner: Arc<SimInner>,
}

impl Simulation {
    /// Create a simulation over a platform, anchoring simulated time at
    /// the current (virtual) instant.
    pub fn new(platform: Platform) -> Self {
        Self::with_fabric(platform, Fabric::default())
    }

    pub fn with_fabric(platform: Platform, fabric: Fabric) -> Self {
        Self {
            inner: Arc::new(SimInner {
                clock: SimClock::new(),
                platform: Arc::new(platform),
                registry: Arc::new(ServiceRegistry::default()),
                fabric,
            }),
        }
    }

    /// Build a current-thread paused-clock runtime and run `f` on it.
    /// Intended for non-test drivers; tests use
    /// `#[tokio::test(start_paused = true)]` directly.
    pub fn run<F, Fut>(platform: Platform, f: F) -> Result<Fut::Output, std::io::Error>
    where
        F: FnOnce(Simulation) -> Fut,
        Fut: Future,
    {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()?;
        Ok(runtime.block_on(async move { f(Simulation::new(platform)).await }))
    }

    pub fn clock(&self) -> &SimClock {
        &self.inner.clock
    }

    pub fn now(&self) -> f64 {
        self.inner.clock.now()
    }

    pub fn platform(&self) -> &Arc<Platform> {
        &self.inner.platform
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.inner.registry
    }

    pub fn fabric(&self) -> &Fabric {
        &self.inner.fabric
    }

    /// Build the context for a new service daemon (mailbox included).
    pub fn service_ctx(
        &self,
        name: impl Into<ServiceName>,
        host: impl Into<HostName>,
        properties: PropertyBag,
    ) -> ServiceCtx {
        let name = name.into();
        let commport = self.inner.fabric.commport(name.as_str());
        ServiceCtx::new(self.clone(), name, host.into(), commport, properties)
    }

    /// Register and spawn a service daemon. With `auto_restart`, a
    /// non-zero exit re-enters `main()` (which rebuilds its ledgers from
    /// the platform); a clean exit or a kill always stops the daemon.
    pub fn launch<S: Service>(&self, mut svc: S, auto_restart: bool) -> Endpoint {
        let name = svc.ctx().name.clone();
        let endpoint = svc.ctx().endpoint();
        let kill = svc.ctx().kill_token();
        self.inner.registry.register(
            name.clone(),
            RegistryEntry {
                endpoint: endpoint.clone(),
                state: ServiceState::Up,
                kind: svc.kind(),
                support: svc.job_support(),
                scratch: svc.scratch(),
                kill: kill.clone(),
                daemon_lock: svc.ctx().daemon_lock(),
            },
        );
        let registry = Arc::clone(&self.inner.registry);
        tracing::info!(service = %name, host = %svc.ctx().host, "service starting");
        tokio::spawn(async move {
            loop {
                let code = tokio::select! {
                    code = svc.main() => code,
                    _ = kill.cancelled() => {
                        tracing::info!(service = %name, "service killed");
                        break;
                    }
                };
                if code == 0 || !auto_restart {
                    if code != 0 {
                        tracing::warn!(service = %name, code, "service crashed");
                    }
                    break;
                }
                tracing::warn!(service = %name, code, "service crashed, restarting");
            }
            registry.set_state(name.as_str(), ServiceState::Down);
        });
        endpoint
    }

    /// Graceful stop: the daemon drains or cancels in-flight work per
    /// `cause`, acknowledges, and goes DOWN.
    pub async fn stop_service(
        &self,
        name: &str,
        notify_pending: bool,
        cause: TerminationCause,
    ) -> SimResult<()> {
        let endpoint = self.registry().assert_up(name)?;
        let reply =
            request(self.fabric(), &endpoint, Some(DEFAULT_RPC_TIMEOUT), |reply| {
                Message::Control(ControlMessage::Stop { notify_pending, cause, reply })
            })
            .await?;
        match reply {
            Message::Control(ControlMessage::Stopped { .. }) => {
                self.registry().set_state(name, ServiceState::Down);
                Ok(())
            }
            _ => Err(dr_wire::protocol_error(name)),
        }
    }

    /// Abrupt termination: cancel the daemon's task at its next suspension
    /// point; its executors crash through their child tokens. No
    /// acknowledgement.
    pub fn kill_service(&self, name: &str) {
        if let Some(entry) = self.registry().entry(name) {
            let _guard = entry.daemon_lock.lock();
            entry.kill.cancel();
            self.registry().set_state(name, ServiceState::Down);
        }
    }

    /// Freeze a service, preserving in-flight progress.
    pub async fn suspend_service(&self, name: &str) -> SimResult<()> {
        let endpoint = self.registry().assert_up(name)?;
        let reply = request(self.fabric(), &endpoint, Some(DEFAULT_RPC_TIMEOUT), |reply| {
            Message::Control(ControlMessage::Suspend { reply })
        })
        .await?;
        match reply {
            Message::Control(ControlMessage::Suspended { .. }) => Ok(()),
            _ => Err(dr_wire::protocol_error(name)),
        }
    }

    pub async fn resume_service(&self, name: &str) -> SimResult<()> {
        let endpoint = self.registry().assert_up(name)?;
        let reply = request(self.fabric(), &endpoint, Some(DEFAULT_RPC_TIMEOUT), |reply| {
            Message::Control(ControlMessage::Resume { reply })
        })
        .await?;
        match reply {
            Message::Control(ControlMessage::Resumed { .. }) => Ok(()),
            _ => Err(dr_wire::protocol_error(name)),
        }
    }

    /// Endpoint of a service that must currently be up.
    pub fn endpoint_of(&self, name: &str) -> SimResult<Endpoint> {
        self.registry().assert_up(name)
    }

    /// Convenience: `ServiceIsDown` for a named service.
    pub fn down_cause(&self, name: &str) -> FailureCause {
        FailureCause::ServiceIsDown { service: ServiceName::new(name) }
    }
}
