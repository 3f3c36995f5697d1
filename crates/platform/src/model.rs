// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Declarative platform description.
//!
//! Hosts, disks, links, and routes as written in a platform file (TOML) or
//! assembled through the builder. Speeds are flop/s, bandwidths bytes/s,
//! sizes bytes, latencies seconds.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One disk attached to a host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskSpec {
    pub mount: String,
    pub capacity: u64,
    pub read_bw: f64,
    pub write_bw: f64,
}

/// One host: compute speed, core count, RAM, and attached disks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostSpec {
    pub speed: f64,
    pub cores: usize,
    pub ram: u64,
    #[serde(default)]
    pub disks: Vec<DiskSpec>,
}

impl HostSpec {
    pub fn new(speed: f64, cores: usize, ram: u64) -> Self {
        Self { speed, cores, ram, disks: Vec::new() }
    }

    /// Attach a disk. Chainable.
    pub fn disk(
        mut self,
        mount: impl Into<String>,
        capacity: u64,
        read_bw: f64,
        write_bw: f64,
    ) -> Self {
        self.disks.push(DiskSpec { mount: mount.into(), capacity, read_bw, write_bw });
        self
    }
}

/// One network link.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinkSpec {
    pub bandwidth: f64,
    pub latency: f64,
}

/// One route: an ordered host pair served by a link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSpec {
    pub src: String,
    pub dst: String,
    pub link: String,
}

/// The full platform description, deserializable from TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlatformDescription {
    #[serde(default)]
    pub hosts: IndexMap<String, HostSpec>,
    #[serde(default)]
    pub links: IndexMap<String, LinkSpec>,
    #[serde(default)]
    pub routes: Vec<RouteSpec>,
}
