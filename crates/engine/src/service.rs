// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Service base: every simulated service is a named daemon on a host with
//! a mailbox-driven main loop.
//!
//! The runner wraps `main()` in a kill-token select: `kill` terminates the
//! daemon abruptly at its next suspension point (outstanding executors are
//! crashed through their child tokens), while graceful `stop` is a
//! protocol message the daemon answers itself. Auto-restarted services
//! re-enter `main()`, which must rebuild its ledgers from the platform —
//! never from pre-crash memory.

use crate::registry::{JobSupport, ServiceKind};
use crate::simulation::Simulation;
use dr_core::{HostName, PropertyBag, ServiceName, SimClock};
use dr_wire::{Commport, Endpoint};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Per-daemon context: identity, mailbox, knobs, and simulation access.
pub struct ServiceCtx {
    pub name: ServiceName,
    pub host: HostName,
    pub commport: Commport,
    pub properties: PropertyBag,
    sim: Simulation,
    kill: CancellationToken,
    daemon_lock: Arc<Mutex<()>>,
}

impl ServiceCtx {
    pub(crate) fn new(
        sim: Simulation,
        name: ServiceName,
        host: HostName,
        commport: Commport,
        properties: PropertyBag,
    ) -> Self {
        Self {
            name,
            host,
            commport,
            properties,
            sim,
            kill: CancellationToken::new(),
            daemon_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn sim(&self) -> &Simulation {
        &self.sim
    }

    pub fn clock(&self) -> &SimClock {
        self.sim.clock()
    }

    pub fn now(&self) -> f64 {
        self.sim.clock().now()
    }

    pub fn endpoint(&self) -> Endpoint {
        self.commport.endpoint()
    }

    pub fn kill_token(&self) -> CancellationToken {
        self.kill.clone()
    }

    pub(crate) fn daemon_lock(&self) -> Arc<Mutex<()>> {
        Arc::clone(&self.daemon_lock)
    }

    /// Hold this guard across a multi-step ledger mutation with no
    /// suspension points; `kill` waits for it before cancelling.
    pub fn lock_daemon(&self) -> parking_lot::MutexGuard<'_, ()> {
        self.daemon_lock.lock()
    }
}

/// A simulated daemon. `main()` runs the receive→handle→dispatch loop and
/// returns an exit code: 0 for a clean stop, non-zero to signal a crash
/// (which triggers auto-restart when enabled).
#[async_trait::async_trait]
pub trait Service: Send + 'static {
    fn ctx(&self) -> &ServiceCtx;
    fn ctx_mut(&mut self) -> &mut ServiceCtx;

    fn kind(&self) -> ServiceKind {
        ServiceKind::Helper
    }

    fn job_support(&self) -> JobSupport {
        JobSupport::default()
    }

    fn scratch(&self) -> Option<ServiceName> {
        None
    }

    async fn main(&mut self) -> u8;
}
