// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The service registry.
//!
//! Services reference each other by [`ServiceName`] and resolve endpoints
//! here, which keeps service↔service relationships acyclic: traversal is
//! by lookup, never by holding the peer. The registry also tracks each
//! service's lifecycle state so clients can fail fast with
//! `ServiceIsDown` instead of talking to a dead mailbox.

use dr_core::{FailureCause, ServiceName, SimResult};
use dr_wire::Endpoint;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Lifecycle state of a registered service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Up,
    Down,
    Suspended,
}

dr_core::simple_display! {
    ServiceState {
        Up => "up",
        Down => "down",
        Suspended => "suspended",
    }
}

/// Broad category of a registered service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Compute,
    Storage,
    Controller,
    Helper,
}

/// Job kinds a compute service accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobSupport {
    pub standard: bool,
    pub pilot: bool,
    pub grid: bool,
}

impl JobSupport {
    pub fn standard_only() -> Self {
        Self { standard: true, pilot: false, grid: false }
    }

    pub fn standard_and_pilot() -> Self {
        Self { standard: true, pilot: true, grid: false }
    }
}

/// Everything the registry knows about one service.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub endpoint: Endpoint,
    pub state: ServiceState,
    pub kind: ServiceKind,
    pub support: JobSupport,
    pub scratch: Option<ServiceName>,
    pub kill: CancellationToken,
    /// Excludes abrupt kill while the daemon is inside a multi-step
    /// ledger mutation (a dispatch pass).
    pub daemon_lock: Arc<Mutex<()>>,
}

/// Arena of live and dead services, keyed by name.
#[derive(Default)]
pub struct ServiceRegistry {
    inner: Mutex<HashMap<ServiceName, RegistryEntry>>,
}

impl ServiceRegistry {
    pub fn register(&self, name: ServiceName, entry: RegistryEntry) {
        self.inner.lock().insert(name, entry);
    }

    pub fn entry(&self, name: &str) -> Option<RegistryEntry> {
        self.inner.lock().get(name).cloned()
    }

    pub fn state(&self, name: &str) -> Option<ServiceState> {
        self.inner.lock().get(name).map(|e| e.state)
    }

    pub fn set_state(&self, name: &str, state: ServiceState) {
        if let Some(entry) = self.inner.lock().get_mut(name) {
            entry.state = state;
        }
    }

    /// Endpoint of a service that is not DOWN. An unknown name is a
    /// network-level error; a known-but-down service answers
    /// `ServiceIsDown`.
    pub fn assert_up(&self, name: &str) -> SimResult<Endpoint> {
        let inner = self.inner.lock();
        let entry = inner
            .get(name)
            .ok_or_else(|| FailureCause::NetworkError { endpoint: name.to_string() })?;
        if entry.state == ServiceState::Down {
            return Err(FailureCause::ServiceIsDown { service: ServiceName::new(name) });
        }
        Ok(entry.endpoint.clone())
    }

    /// Names of all registered services of a kind, any state.
    pub fn services_of_kind(&self, kind: ServiceKind) -> Vec<ServiceName> {
        self.inner.lock().iter().filter(|(_, e)| e.kind == kind).map(|(n, _)| n.clone()).collect()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
