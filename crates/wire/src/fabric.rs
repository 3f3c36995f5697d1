// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Commport factory and link accounting.
//!
//! The fabric mints named mailboxes and the temporary reply ports used for
//! request/reply exchanges. Transfer accounting is a single link profile:
//! latency plus payload/bandwidth. The default profile is instant, which
//! keeps control traffic free; simulations that care about message cost
//! configure a real profile.

use crate::commport::Commport;

/// Bandwidth/latency of the link commport traffic is accounted on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkProfile {
    /// Bytes per second. Non-finite means transfers cost latency only.
    pub bandwidth: f64,
    /// Seconds added to every transfer.
    pub latency: f64,
}

impl LinkProfile {
    /// A link with no cost: infinite bandwidth, zero latency.
    pub const fn instant() -> Self {
        Self { bandwidth: f64::INFINITY, latency: 0.0 }
    }

    pub fn new(bandwidth: f64, latency: f64) -> Self {
        Self { bandwidth, latency }
    }

    /// Simulated seconds to move `bytes` across this link.
    pub fn transfer_delay(&self, bytes: u64) -> f64 {
        if self.bandwidth.is_finite() && self.bandwidth > 0.0 {
            self.latency + bytes as f64 / self.bandwidth
        } else {
            self.latency
        }
    }
}

impl Default for LinkProfile {
    fn default() -> Self {
        Self::instant()
    }
}

/// Default bound on a mailbox before `put` backpressures.
pub const DEFAULT_COMMPORT_CAPACITY: usize = 256;

/// Default timeout for client request/reply exchanges, in simulated
/// seconds. Internal RPCs whose reply port lifetime is owned by the caller
/// pass `None` instead.
pub const DEFAULT_RPC_TIMEOUT: f64 = 600.0;

/// Mints commports sharing one link profile and capacity.
#[derive(Debug, Clone)]
pub struct Fabric {
    profile: LinkProfile,
    capacity: usize,
}

impl Fabric {
    pub fn new(profile: LinkProfile, capacity: usize) -> Self {
        Self { profile, capacity }
    }

    pub fn profile(&self) -> LinkProfile {
        self.profile
    }

    /// Create the named mailbox for a service daemon.
    pub fn commport(&self, name: impl Into<String>) -> Commport {
        Commport::new(name, self.capacity, self.profile)
    }

    /// Mint a uniquely-named reply port for one request/reply exchange.
    /// The port is retired when dropped.
    pub fn temporary(&self) -> Commport {
        Commport::new(format!("tmp-{}", nanoid::nanoid!(8)), self.capacity, self.profile)
    }
}

impl Default for Fabric {
    fn default() -> Self {
        Self::new(LinkProfile::instant(), DEFAULT_COMMPORT_CAPACITY)
    }
}
