// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The data movement manager.
//!
//! Synchronous file operations for controllers, plus asynchronous
//! variants whose completion/failure events land on the controller's
//! event bus.

use dr_core::{ExecutionEvent, FileLocation, SimResult};
use dr_engine::rpc;
use dr_engine::Simulation;
use dr_wire::{Endpoint, Message, DEFAULT_RPC_TIMEOUT};

/// Initiates file movements on behalf of one controller.
#[derive(Clone)]
pub struct DataMovementManager {
    sim: Simulation,
    controller: Endpoint,
}

impl DataMovementManager {
    pub(crate) fn new(sim: Simulation, controller: Endpoint) -> Self {
        Self { sim, controller }
    }

    /// Copy synchronously; the caller gets the result, no event is
    /// emitted.
    pub async fn copy(&self, src: &FileLocation, dst: &FileLocation) -> SimResult<()> {
        rpc::file_copy(&self.sim, src, dst, Some(DEFAULT_RPC_TIMEOUT)).await
    }

    /// Start an asynchronous copy; a `FileCopyCompleted`/`FileCopyFailed`
    /// event follows on the controller's bus.
    pub fn initiate_copy(&self, src: FileLocation, dst: FileLocation) {
        let sim = self.sim.clone();
        let controller = self.controller.clone();
        tokio::spawn(async move {
            let result = rpc::file_copy(&sim, &src, &dst, Some(DEFAULT_RPC_TIMEOUT)).await;
            let event = match result {
                Ok(()) => ExecutionEvent::FileCopyCompleted { src, dst },
                Err(cause) => ExecutionEvent::FileCopyFailed { src, dst, cause },
            };
            if let Err(cause) = controller.put(Message::Event(Box::new(event))).await {
                tracing::debug!(%cause, "controller is gone");
            }
        });
    }

    /// Start an asynchronous read; a read event follows on the bus.
    pub fn initiate_read(&self, location: FileLocation) {
        let sim = self.sim.clone();
        let controller = self.controller.clone();
        tokio::spawn(async move {
            let result = rpc::file_read(&sim, &location, None, Some(DEFAULT_RPC_TIMEOUT)).await;
            let event = match result {
                Ok(_) => ExecutionEvent::FileReadCompleted { location },
                Err(cause) => ExecutionEvent::FileReadFailed { location, cause },
            };
            if let Err(cause) = controller.put(Message::Event(Box::new(event))).await {
                tracing::debug!(%cause, "controller is gone");
            }
        });
    }

    /// Start an asynchronous write; a write event follows on the bus.
    pub fn initiate_write(&self, location: FileLocation) {
        let sim = self.sim.clone();
        let controller = self.controller.clone();
        tokio::spawn(async move {
            let result = rpc::file_write(&sim, &location, Some(DEFAULT_RPC_TIMEOUT)).await;
            let event = match result {
                Ok(()) => ExecutionEvent::FileWriteCompleted { location },
                Err(cause) => ExecutionEvent::FileWriteFailed { location, cause },
            };
            if let Err(cause) = controller.put(Message::Event(Box::new(event))).await {
                tracing::debug!(%cause, "controller is gone");
            }
        });
    }
}
