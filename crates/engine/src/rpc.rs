// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request/reply clients for the storage protocol.
//!
//! Used by action executors for file actions and re-exported to the
//! storage and control crates so every caller speaks the protocol the same
//! way. `timeout: None` is reserved for internal RPCs whose caller owns
//! the reply port's lifetime (executors are cancellable as a whole).

use crate::simulation::Simulation;
use dr_core::{DataFile, FileLocation, SimResult};
use dr_wire::{protocol_error, request, Message, StorageMessage};

pub async fn file_write(
    sim: &Simulation,
    location: &FileLocation,
    timeout: Option<f64>,
) -> SimResult<()> {
    let endpoint = sim.registry().assert_up(location.service().as_str())?;
    let reply = request(sim.fabric(), &endpoint, timeout, |reply| {
        Message::Storage(StorageMessage::Write { location: location.clone(), reply })
    })
    .await?;
    match reply {
        Message::Storage(StorageMessage::WriteReply { result }) => result,
        _ => Err(protocol_error(location.service().as_str())),
    }
}

/// Read a file (or its first `num_bytes`). Returns the bytes delivered.
pub async fn file_read(
    sim: &Simulation,
    location: &FileLocation,
    num_bytes: Option<u64>,
    timeout: Option<f64>,
) -> SimResult<u64> {
    let endpoint = sim.registry().assert_up(location.service().as_str())?;
    let reply = request(sim.fabric(), &endpoint, timeout, |reply| {
        Message::Storage(StorageMessage::Read { location: location.clone(), num_bytes, reply })
    })
    .await?;
    match reply {
        Message::Storage(StorageMessage::ReadReply { result }) => result,
        _ => Err(protocol_error(location.service().as_str())),
    }
}

/// Copy `src` to `dst`. The request goes to the destination service,
/// which pulls from the source.
pub async fn file_copy(
    sim: &Simulation,
    src: &FileLocation,
    dst: &FileLocation,
    timeout: Option<f64>,
) -> SimResult<()> {
    let endpoint = sim.registry().assert_up(dst.service().as_str())?;
    let reply = request(sim.fabric(), &endpoint, timeout, |reply| {
        Message::Storage(StorageMessage::Copy { src: src.clone(), dst: dst.clone(), reply })
    })
    .await?;
    match reply {
        Message::Storage(StorageMessage::CopyReply { result }) => result,
        _ => Err(protocol_error(dst.service().as_str())),
    }
}

pub async fn file_delete(
    sim: &Simulation,
    location: &FileLocation,
    timeout: Option<f64>,
) -> SimResult<()> {
    let endpoint = sim.registry().assert_up(location.service().as_str())?;
    let reply = request(sim.fabric(), &endpoint, timeout, |reply| {
        Message::Storage(StorageMessage::Delete { location: location.clone(), reply })
    })
    .await?;
    match reply {
        Message::Storage(StorageMessage::DeleteReply { result }) => result,
        _ => Err(protocol_error(location.service().as_str())),
    }
}

/// Locations a storage service holds for a file; empty when unknown.
pub async fn file_lookup(
    sim: &Simulation,
    service: &str,
    file: &DataFile,
    timeout: Option<f64>,
) -> SimResult<Vec<FileLocation>> {
    let endpoint = sim.registry().assert_up(service)?;
    let reply = request(sim.fabric(), &endpoint, timeout, |reply| {
        Message::Storage(StorageMessage::Lookup { file: file.clone(), reply })
    })
    .await?;
    match reply {
        Message::Storage(StorageMessage::LookupReply { locations }) => Ok(locations),
        _ => Err(protocol_error(service)),
    }
}

pub async fn free_space(sim: &Simulation, service: &str, timeout: Option<f64>) -> SimResult<u64> {
    let endpoint = sim.registry().assert_up(service)?;
    let reply = request(sim.fabric(), &endpoint, timeout, |reply| {
        Message::Storage(StorageMessage::FreeSpace { reply })
    })
    .await?;
    match reply {
        Message::Storage(StorageMessage::FreeSpaceReply { bytes }) => Ok(bytes),
        _ => Err(protocol_error(service)),
    }
}

pub async fn last_write_date(
    sim: &Simulation,
    service: &str,
    file: &DataFile,
    timeout: Option<f64>,
) -> SimResult<f64> {
    let endpoint = sim.registry().assert_up(service)?;
    let reply = request(sim.fabric(), &endpoint, timeout, |reply| {
        Message::Storage(StorageMessage::LastWriteDate { file: file.clone(), reply })
    })
    .await?;
    match reply {
        Message::Storage(StorageMessage::LastWriteDateReply { result }) => result,
        _ => Err(protocol_error(service)),
    }
}

pub async fn storage_load(
    sim: &Simulation,
    service: &str,
    timeout: Option<f64>,
) -> SimResult<f64> {
    let endpoint = sim.registry().assert_up(service)?;
    let reply = request(sim.fabric(), &endpoint, timeout, |reply| {
        Message::Storage(StorageMessage::Load { reply })
    })
    .await?;
    match reply {
        Message::Storage(StorageMessage::LoadReply { result }) => result,
        _ => Err(protocol_error(service)),
    }
}
