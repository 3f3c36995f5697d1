// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime platform state.
//!
//! The [`Platform`] owns host power state and answers the narrow interface
//! the kernel consumes: host inventory, capacities, disks, links, and
//! power-state changes with subscriber notification. Virtual hosts (VM
//! reservations) are synthetic entries backed by a physical host; they
//! inherit its speed and follow its power state.

use crate::model::{DiskSpec, HostSpec, LinkSpec, PlatformDescription, RouteSpec};
use dr_core::{HostName, LinkName};
use dr_wire::{ControlMessage, Endpoint, Message};
use indexmap::IndexMap;
use parking_lot::Mutex;
use thiserror::Error;

/// Errors in the platform description or lookups against it.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("unknown host '{0}'")]
    UnknownHost(String),
    #[error("host '{0}' already exists")]
    DuplicateHost(String),
    #[error("no disk mounted at '{mount}' on host '{host}'")]
    UnknownDisk { host: String, mount: String },
    #[error("host '{0}' is not a virtual host")]
    NotVirtual(String),
    #[error("invalid platform description: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone)]
struct HostState {
    speed: f64,
    cores: usize,
    ram: u64,
    disks: Vec<DiskSpec>,
    on: bool,
    /// Physical host backing a virtual host; `None` for physical hosts.
    backing: Option<HostName>,
}

#[derive(Default)]
struct Inner {
    hosts: IndexMap<HostName, HostState>,
    links: IndexMap<LinkName, LinkSpec>,
    routes: Vec<RouteSpec>,
    subscribers: Vec<Endpoint>,
}

/// Shared, mutable platform state. Cheap to clone via `Arc` at the
/// simulation level; internally a single mutex guards the ledgers.
pub struct Platform {
    inner: Mutex<Inner>,
}

impl Platform {
    pub fn builder() -> PlatformBuilder {
        PlatformBuilder::default()
    }

    /// Build a platform from a TOML description.
    pub fn from_toml(text: &str) -> Result<Self, PlatformError> {
        let description: PlatformDescription = toml::from_str(text)?;
        Ok(Self::from_description(description))
    }

    pub fn from_description(description: PlatformDescription) -> Self {
        let mut inner = Inner::default();
        for (name, spec) in description.hosts {
            inner.hosts.insert(
                HostName::new(name),
                HostState {
                    speed: spec.speed,
                    cores: spec.cores,
                    ram: spec.ram,
                    disks: spec.disks,
                    on: true,
                    backing: None,
                },
            );
        }
        for (name, link) in description.links {
            inner.links.insert(LinkName::new(name), link);
        }
        inner.routes = description.routes;
        Self { inner: Mutex::new(inner) }
    }

    /// Host names in declaration order (virtual hosts included, appended).
    pub fn hosts(&self) -> Vec<HostName> {
        self.inner.lock().hosts.keys().cloned().collect()
    }

    pub fn has_host(&self, host: &str) -> bool {
        self.inner.lock().hosts.contains_key(host)
    }

    fn host<T>(&self, host: &str, f: impl FnOnce(&HostState) -> T) -> Result<T, PlatformError> {
        let inner = self.inner.lock();
        let state =
            inner.hosts.get(host).ok_or_else(|| PlatformError::UnknownHost(host.to_string()))?;
        Ok(f(state))
    }

    pub fn host_cores(&self, host: &str) -> Result<usize, PlatformError> {
        self.host(host, |h| h.cores)
    }

    pub fn host_memory(&self, host: &str) -> Result<u64, PlatformError> {
        self.host(host, |h| h.ram)
    }

    pub fn host_speed(&self, host: &str) -> Result<f64, PlatformError> {
        self.host(host, |h| h.speed)
    }

    /// Power state. A virtual host is on iff both it and its backing host
    /// are on. Unknown hosts read as off.
    pub fn host_is_on(&self, host: &str) -> bool {
        let inner = self.inner.lock();
        let Some(state) = inner.hosts.get(host) else {
            return false;
        };
        if !state.on {
            return false;
        }
        match &state.backing {
            None => true,
            Some(physical) => inner.hosts.get(physical.as_str()).is_some_and(|p| p.on),
        }
    }

    pub fn disk(&self, host: &str, mount: &str) -> Result<DiskSpec, PlatformError> {
        let inner = self.inner.lock();
        let state =
            inner.hosts.get(host).ok_or_else(|| PlatformError::UnknownHost(host.to_string()))?;
        state
            .disks
            .iter()
            .find(|d| d.mount == mount)
            .cloned()
            .ok_or_else(|| PlatformError::UnknownDisk {
                host: host.to_string(),
                mount: mount.to_string(),
            })
    }

    pub fn disk_size(&self, host: &str, mount: &str) -> Result<u64, PlatformError> {
        Ok(self.disk(host, mount)?.capacity)
    }

    pub fn link_exists(&self, link: &str) -> bool {
        self.inner.lock().links.contains_key(link)
    }

    pub fn link(&self, link: &str) -> Option<LinkSpec> {
        self.inner.lock().links.get(link).copied()
    }

    pub fn routes(&self) -> Vec<RouteSpec> {
        self.inner.lock().routes.clone()
    }

    /// Register a commport to be told about host power-state changes.
    pub fn subscribe(&self, endpoint: Endpoint) {
        self.inner.lock().subscribers.push(endpoint);
    }

    /// Power a host off and notify subscribers, including one notification
    /// per virtual host the physical host backs.
    pub fn turn_off(&self, host: &str) -> Result<(), PlatformError> {
        self.set_power(host, false)
    }

    pub fn turn_on(&self, host: &str) -> Result<(), PlatformError> {
        self.set_power(host, true)
    }

    fn set_power(&self, host: &str, on: bool) -> Result<(), PlatformError> {
        let (affected, subscribers) = {
            let mut inner = self.inner.lock();
            let state = inner
                .hosts
                .get_mut(host)
                .ok_or_else(|| PlatformError::UnknownHost(host.to_string()))?;
            state.on = on;
            let mut affected = vec![HostName::new(host)];
            affected.extend(
                inner
                    .hosts
                    .iter()
                    .filter(|(_, s)| s.backing.as_ref().map(HostName::as_str) == Some(host))
                    .map(|(name, _)| name.clone()),
            );
            (affected, inner.subscribers.clone())
        };
        tracing::info!(host, on, dependents = affected.len() - 1, "host power state changed");
        for endpoint in &subscribers {
            for host in &affected {
                endpoint.dput(Message::Control(ControlMessage::HostStateChanged {
                    host: host.clone(),
                    on,
                }));
            }
        }
        Ok(())
    }

    /// Register a virtual host backed by a physical one. Speed is
    /// inherited from the backing host.
    pub fn add_virtual_host(
        &self,
        name: &str,
        backing: &str,
        cores: usize,
        ram: u64,
    ) -> Result<(), PlatformError> {
        let mut inner = self.inner.lock();
        if inner.hosts.contains_key(name) {
            return Err(PlatformError::DuplicateHost(name.to_string()));
        }
        let physical = inner
            .hosts
            .get(backing)
            .ok_or_else(|| PlatformError::UnknownHost(backing.to_string()))?;
        let speed = physical.speed;
        inner.hosts.insert(
            HostName::new(name),
            HostState {
                speed,
                cores,
                ram,
                disks: Vec::new(),
                on: true,
                backing: Some(HostName::new(backing)),
            },
        );
        Ok(())
    }

    /// Re-back a virtual host onto another physical host (VM migration).
    pub fn rebind_virtual_host(&self, name: &str, backing: &str) -> Result<(), PlatformError> {
        let mut inner = self.inner.lock();
        if !inner.hosts.contains_key(backing) {
            return Err(PlatformError::UnknownHost(backing.to_string()));
        }
        let new_speed = inner.hosts[backing].speed;
        let state = inner
            .hosts
            .get_mut(name)
            .ok_or_else(|| PlatformError::UnknownHost(name.to_string()))?;
        if state.backing.is_none() {
            return Err(PlatformError::NotVirtual(name.to_string()));
        }
        state.backing = Some(HostName::new(backing));
        state.speed = new_speed;
        Ok(())
    }

    pub fn remove_virtual_host(&self, name: &str) -> Result<(), PlatformError> {
        let mut inner = self.inner.lock();
        let state =
            inner.hosts.get(name).ok_or_else(|| PlatformError::UnknownHost(name.to_string()))?;
        if state.backing.is_none() {
            return Err(PlatformError::NotVirtual(name.to_string()));
        }
        inner.hosts.shift_remove(name);
        Ok(())
    }
}

/// Chainable in-code alternative to a platform file.
#[derive(Default)]
pub struct PlatformBuilder {
    description: PlatformDescription,
}

impl PlatformBuilder {
    pub fn host(mut self, name: impl Into<String>, spec: HostSpec) -> Self {
        self.description.hosts.insert(name.into(), spec);
        self
    }

    pub fn link(mut self, name: impl Into<String>, bandwidth: f64, latency: f64) -> Self {
        self.description.links.insert(name.into(), LinkSpec { bandwidth, latency });
        self
    }

    pub fn route(
        mut self,
        src: impl Into<String>,
        dst: impl Into<String>,
        link: impl Into<String>,
    ) -> Self {
        self.description.routes.push(RouteSpec {
            src: src.into(),
            dst: dst.into(),
            link: link.into(),
        });
        self
    }

    pub fn build(self) -> Platform {
        Platform::from_description(self.description)
    }
}

#[cfg(test)]
#[path = "platform_tests.rs"]
mod tests;
