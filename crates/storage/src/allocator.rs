// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pluggable stripe allocation for the compound storage service.
//!
//! A selector is a value, not a hierarchy: given the file, the members'
//! free bytes, the existing allocation map, and the allocations already
//! granted during the current operation, it returns the ordered stripe
//! locations — or an empty list when the file cannot be placed.

use dr_core::{DataFile, FileLocation, ServiceName};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Allocation map of a compound storage: ordered stripe locations per
/// file id.
pub type AllocationMap = HashMap<String, Vec<FileLocation>>;

/// The selection callback. Returning an empty vector means the file does
/// not fit.
pub type StorageSelector = Arc<
    dyn Fn(&DataFile, &IndexMap<ServiceName, u64>, &AllocationMap, &[FileLocation]) -> Vec<FileLocation>
        + Send
        + Sync,
>;

/// Split a file into chunk-bounded part sizes. A non-positive or
/// infinite chunk yields a single part.
pub fn split_sizes(size: u64, chunk: Option<u64>) -> Vec<u64> {
    match chunk {
        Some(chunk) if chunk > 0 && size > chunk => {
            let mut parts = Vec::with_capacity((size / chunk + 1) as usize);
            let mut remaining = size;
            while remaining > 0 {
                let part = remaining.min(chunk);
                parts.push(part);
                remaining -= part;
            }
            parts
        }
        _ => vec![size],
    }
}

/// The reference allocator: iterate members by descending free bytes,
/// skip those without room, and never give two stripes of one file to the
/// same member while striping. Sub-files get synthetic `#pN` ids; a
/// single-part allocation keeps the file itself.
pub fn round_robin_selector(striping: bool, chunk: Option<u64>) -> StorageSelector {
    Arc::new(move |file, resources, _existing, _prior| {
        let parts = if striping { split_sizes(file.size(), chunk) } else { vec![file.size()] };

        let mut order: Vec<(ServiceName, u64)> =
            resources.iter().map(|(name, free)| (name.clone(), *free)).collect();
        // Stable sort: ties keep member declaration order.
        order.sort_by(|a, b| b.1.cmp(&a.1));

        let mut stripes = Vec::with_capacity(parts.len());
        let mut used: Vec<ServiceName> = Vec::new();
        let mut cursor = 0usize;
        for (index, part) in parts.iter().enumerate() {
            let mut placed = None;
            for probe in 0..order.len() {
                let at = (cursor + probe) % order.len();
                let (name, free) = &order[at];
                if striping && parts.len() > 1 && used.contains(name) {
                    continue;
                }
                if *free < *part {
                    continue;
                }
                placed = Some(at);
                break;
            }
            let Some(at) = placed else {
                return Vec::new();
            };
            let (name, free) = &mut order[at];
            *free -= *part;
            used.push(name.clone());
            let sub_file = if parts.len() > 1 {
                DataFile::new(format!("{}#p{}", file.id(), index), *part)
            } else {
                file.clone()
            };
            stripes.push(FileLocation::new(name.clone(), "/", sub_file));
            cursor = (at + 1) % order.len();
        }
        stripes
    })
}

#[cfg(test)]
#[path = "allocator_tests.rs"]
mod tests;
