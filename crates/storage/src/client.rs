// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client handle for talking to a storage service (simple or compound)
//! from controllers and tests.

use dr_core::{DataFile, FileLocation, ServiceName, SimResult};
use dr_engine::rpc;
use dr_engine::Simulation;
use dr_wire::DEFAULT_RPC_TIMEOUT;

/// A by-name handle to a storage service endpoint.
#[derive(Clone)]
pub struct StorageClient {
    sim: Simulation,
    name: ServiceName,
}

impl StorageClient {
    pub fn new(sim: Simulation, name: impl Into<ServiceName>) -> Self {
        Self { sim, name: name.into() }
    }

    pub fn name(&self) -> &ServiceName {
        &self.name
    }

    /// A location on this storage under `prefix`.
    pub fn location(&self, prefix: &str, file: DataFile) -> FileLocation {
        FileLocation::new(self.name.clone(), prefix, file)
    }

    pub async fn write(&self, location: &FileLocation) -> SimResult<()> {
        rpc::file_write(&self.sim, location, Some(DEFAULT_RPC_TIMEOUT)).await
    }

    pub async fn read(&self, location: &FileLocation) -> SimResult<u64> {
        rpc::file_read(&self.sim, location, None, Some(DEFAULT_RPC_TIMEOUT)).await
    }

    pub async fn copy_to(&self, src: &FileLocation, dst: &FileLocation) -> SimResult<()> {
        rpc::file_copy(&self.sim, src, dst, Some(DEFAULT_RPC_TIMEOUT)).await
    }

    pub async fn delete(&self, location: &FileLocation) -> SimResult<()> {
        rpc::file_delete(&self.sim, location, Some(DEFAULT_RPC_TIMEOUT)).await
    }

    /// Stripe (or replica) locations for a file; empty when unknown.
    pub async fn lookup(&self, file: &DataFile) -> SimResult<Vec<FileLocation>> {
        rpc::file_lookup(&self.sim, self.name.as_str(), file, Some(DEFAULT_RPC_TIMEOUT)).await
    }

    pub async fn free_space(&self) -> SimResult<u64> {
        rpc::free_space(&self.sim, self.name.as_str(), Some(DEFAULT_RPC_TIMEOUT)).await
    }

    pub async fn last_write_date(&self, file: &DataFile) -> SimResult<f64> {
        rpc::last_write_date(&self.sim, self.name.as_str(), file, Some(DEFAULT_RPC_TIMEOUT)).await
    }

    pub async fn load(&self) -> SimResult<f64> {
        rpc::storage_load(&self.sim, self.name.as_str(), Some(DEFAULT_RPC_TIMEOUT)).await
    }
}
