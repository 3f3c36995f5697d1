// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Name and id newtypes shared across the simulation.

crate::define_name! {
    /// Name of a (physical or virtual) host in the platform.
    pub struct HostName;
}

crate::define_name! {
    /// Name of a service registered with the simulation.
    ///
    /// Services reference each other by name and resolve endpoints through
    /// the registry, never by holding each other directly.
    pub struct ServiceName;
}

crate::define_name! {
    /// Name of a network link in the platform description.
    pub struct LinkName;
}

crate::define_id! {
    /// Unique identifier for a virtual machine managed by a cloud service.
    pub struct VmId("vm-");
}
