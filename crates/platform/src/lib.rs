// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dr-platform: the hardware the simulation runs on — hosts, disks, links,
//! routes, power state with subscriber notification, and virtual hosts for
//! VM reservations.

pub mod model;
pub mod platform;

pub use model::{DiskSpec, HostSpec, LinkSpec, PlatformDescription, RouteSpec};
pub use platform::{Platform, PlatformBuilder, PlatformError};
