// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dr-storage: storage services of the dryrun kernel — the per-disk
//! physical storage service and the compound storage service with its
//! pluggable striping allocator.

pub mod allocator;
pub mod client;
pub mod compound;
pub mod simple;

pub use allocator::{round_robin_selector, split_sizes, AllocationMap, StorageSelector};
pub use client::StorageClient;
pub use compound::{CompoundStorageService, INTERNAL_STRIPING, MAX_ALLOCATION_CHUNK_SIZE};
pub use simple::{SimpleStorageService, BUFFER_SIZE};
