// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dr-wire: the message and commport fabric of the dryrun kernel — named
//! bounded mailboxes, typed message sums, transfer accounting, and the
//! request/reply pattern.

pub mod commport;
pub mod fabric;
pub mod message;

pub use commport::{Commport, Endpoint};
pub use fabric::{Fabric, LinkProfile, DEFAULT_COMMPORT_CAPACITY, DEFAULT_RPC_TIMEOUT};
pub use message::{
    protocol_error, request, request_with_retries, AesMessage, CloudMessage, ComputeMessage,
    ControlMessage, EstimateCandidate, HostResourceInfo, Message, ResourceInformation, RunSpec,
    StartTimeEstimate, StorageMessage, CONTROL_MESSAGE_BYTES,
};
