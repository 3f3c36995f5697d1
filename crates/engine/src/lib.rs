// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dr-engine: the execution engine of the dryrun kernel — service base and
//! lifecycle, the service registry, the simulation harness, and the Action
//! Execution Service with its single-use executors.

pub mod aes;
pub mod executor;
pub mod registry;
pub mod rpc;
pub mod service;
pub mod simulation;

pub use aes::ActionExecutionService;
pub use executor::ProgressCell;
pub use registry::{JobSupport, RegistryEntry, ServiceKind, ServiceRegistry, ServiceState};
pub use service::{Service, ServiceCtx};
pub use simulation::Simulation;
