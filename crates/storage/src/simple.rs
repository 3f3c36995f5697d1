// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Physical storage service.
//!
//! One daemon per disk: a capacity ledger, a file map, and request/reply
//! file operations whose durations follow the disk's bandwidths. A write
//! only mutates the ledger after its disk time elapsed, so an interrupted
//! write leaves no partial file.

use crate::allocator::split_sizes;
use dr_core::{DataFile, FailureCause, FileLocation, SimResult};
use dr_engine::registry::ServiceKind;
use dr_engine::rpc;
use dr_engine::service::{Service, ServiceCtx};
use dr_platform::PlatformError;
use dr_wire::{ComputeMessage, ControlMessage, Message, StorageMessage};
use std::collections::HashMap;

/// Transfer buffer size in bytes. A bufferized service moves data buffer
/// by buffer, yielding to the simulation between chunks; 0 (the default)
/// means non-bufferized, one fluid transfer per operation.
pub const BUFFER_SIZE: &str = "BUFFER_SIZE";

#[derive(Debug, Clone)]
struct StoredFile {
    location: FileLocation,
    write_date: f64,
}

/// A storage service over one mounted disk.
pub struct SimpleStorageService {
    ctx: ServiceCtx,
    mount: String,
    capacity: u64,
    free: u64,
    read_bw: f64,
    write_bw: f64,
    buffer_size: u64,
    files: HashMap<String, StoredFile>,
    is_scratch: bool,
}

impl SimpleStorageService {
    /// Build a storage service over the disk mounted at `mount` on the
    /// context's host.
    pub fn new(ctx: ServiceCtx, mount: impl Into<String>) -> Result<Self, PlatformError> {
        let mount = mount.into();
        let disk = ctx.sim().platform().disk(ctx.host.as_str(), &mount)?;
        let buffer_size = match ctx.properties.get_u64(BUFFER_SIZE, 0) {
            Ok(size) => size,
            Err(e) => {
                tracing::warn!(service = %ctx.name, %e, "bad buffer size, non-bufferized");
                0
            }
        };
        Ok(Self {
            ctx,
            mount,
            capacity: disk.capacity,
            free: disk.capacity,
            read_bw: disk.read_bw,
            write_bw: disk.write_bw,
            buffer_size,
            files: HashMap::new(),
            is_scratch: false,
        })
    }

    /// Mark this storage as a compute service's scratch space.
    pub fn set_scratch(&mut self, is_scratch: bool) {
        self.is_scratch = is_scratch;
    }

    pub fn is_scratch(&self) -> bool {
        self.is_scratch
    }

    pub fn mount(&self) -> &str {
        &self.mount
    }

    /// Sleep the simulated disk time for `bytes`. A bufferized service
    /// moves one buffer at a time; the total time is the same, but the
    /// transfer suspends at every buffer boundary.
    async fn transfer(&self, bytes: u64, bandwidth: f64) {
        if bandwidth <= 0.0 {
            return;
        }
        let buffer = (self.buffer_size > 0).then_some(self.buffer_size);
        for chunk in split_sizes(bytes, buffer) {
            self.ctx.clock().sleep(chunk as f64 / bandwidth).await;
        }
    }

    /// Free bytes after dropping any file already stored at `path`.
    fn free_after_overwrite(&self, path: &str) -> u64 {
        match self.files.get(path) {
            Some(old) => self.free + old.location.file().size(),
            None => self.free,
        }
    }

    async fn handle_write(&mut self, location: FileLocation) -> SimResult<()> {
        let path = location.path();
        let size = location.file().size();
        if self.free_after_overwrite(&path) < size {
            return Err(FailureCause::StorageServiceNotEnoughSpace {
                file: location.file().clone(),
                storage: self.ctx.name.clone(),
            });
        }
        self.transfer(size, self.write_bw).await;
        if let Some(old) = self.files.remove(&path) {
            self.free += old.location.file().size();
        }
        self.free -= size;
        let write_date = self.ctx.now();
        tracing::debug!(
            service = %self.ctx.name,
            path,
            size,
            free = self.free,
            "file written"
        );
        self.files.insert(path, StoredFile { location, write_date });
        Ok(())
    }

    async fn handle_read(
        &mut self,
        location: &FileLocation,
        num_bytes: Option<u64>,
    ) -> SimResult<u64> {
        let path = location.path();
        let Some(stored) = self.files.get(&path) else {
            return Err(FailureCause::FileNotFound { location: location.clone() });
        };
        let size = stored.location.file().size();
        let bytes = num_bytes.map_or(size, |n| n.min(size));
        self.transfer(bytes, self.read_bw).await;
        Ok(bytes)
    }

    /// Copy with this service as the destination: pull from the source,
    /// then write locally. A same-service copy skips the network read.
    async fn handle_copy(&mut self, src: FileLocation, dst: FileLocation) -> SimResult<()> {
        if src.service() == &self.ctx.name {
            let bytes = self.handle_read(&src, None).await?;
            debug_assert_eq!(bytes, src.file().size());
        } else {
            let sim = self.ctx.sim().clone();
            rpc::file_read(&sim, &src, None, None).await?;
        }
        self.handle_write(dst).await
    }

    async fn handle_delete(&mut self, location: &FileLocation) -> SimResult<()> {
        let path = location.path();
        match self.files.remove(&path) {
            Some(stored) => {
                self.free += stored.location.file().size();
                tracing::debug!(service = %self.ctx.name, path, "file deleted");
                Ok(())
            }
            None => Err(FailureCause::FileNotFound { location: location.clone() }),
        }
    }

    fn lookup(&self, file: &DataFile) -> Vec<FileLocation> {
        self.files
            .values()
            .filter(|stored| stored.location.file() == file)
            .map(|stored| stored.location.clone())
            .collect()
    }

    fn last_write_date(&self, file: &DataFile) -> SimResult<f64> {
        self.files
            .values()
            .filter(|stored| stored.location.file() == file)
            .map(|stored| stored.write_date)
            .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.max(d))))
            .ok_or_else(|| FailureCause::FileNotFound {
                location: FileLocation::new(self.ctx.name.clone(), self.mount.clone(), file.clone()),
            })
    }

    async fn handle_message(&mut self, msg: Message) -> bool {
        match msg {
            Message::Storage(StorageMessage::Write { location, reply }) => {
                let result = self.handle_write(location).await;
                let answer = Message::Storage(StorageMessage::WriteReply { result });
                if let Err(cause) = reply.put(answer).await {
                    tracing::debug!(%cause, "writer is gone");
                }
                true
            }
            Message::Storage(StorageMessage::Read { location, num_bytes, reply }) => {
                let result = self.handle_read(&location, num_bytes).await;
                let answer = Message::Storage(StorageMessage::ReadReply { result });
                if let Err(cause) = reply.put(answer).await {
                    tracing::debug!(%cause, "reader is gone");
                }
                true
            }
            Message::Storage(StorageMessage::Copy { src, dst, reply }) => {
                let result = self.handle_copy(src, dst).await;
                let answer = Message::Storage(StorageMessage::CopyReply { result });
                if let Err(cause) = reply.put(answer).await {
                    tracing::debug!(%cause, "copier is gone");
                }
                true
            }
            Message::Storage(StorageMessage::Delete { location, reply }) => {
                let result = self.handle_delete(&location).await;
                let answer = Message::Storage(StorageMessage::DeleteReply { result });
                if let Err(cause) = reply.put(answer).await {
                    tracing::debug!(%cause, "deleter is gone");
                }
                true
            }
            Message::Storage(StorageMessage::Lookup { file, reply }) => {
                let locations = self.lookup(&file);
                let answer = Message::Storage(StorageMessage::LookupReply { locations });
                if let Err(cause) = reply.put(answer).await {
                    tracing::debug!(%cause, "requester is gone");
                }
                true
            }
            Message::Storage(StorageMessage::FreeSpace { reply }) => {
                let answer = Message::Storage(StorageMessage::FreeSpaceReply { bytes: self.free });
                if let Err(cause) = reply.put(answer).await {
                    tracing::debug!(%cause, "requester is gone");
                }
                true
            }
            Message::Storage(StorageMessage::LastWriteDate { file, reply }) => {
                let result = self.last_write_date(&file);
                let answer = Message::Storage(StorageMessage::LastWriteDateReply { result });
                if let Err(cause) = reply.put(answer).await {
                    tracing::debug!(%cause, "requester is gone");
                }
                true
            }
            Message::Storage(StorageMessage::Load { reply }) => {
                // Disk access is serialized per service; there is no
                // concurrent-stream count to report.
                let answer = Message::Storage(StorageMessage::LoadReply { result: Ok(0.0) });
                if let Err(cause) = reply.put(answer).await {
                    tracing::debug!(%cause, "requester is gone");
                }
                true
            }
            Message::Compute(ComputeMessage::SubmitJob { reply, .. }) => {
                let result = Err(FailureCause::NotAllowed {
                    service: self.ctx.name.clone(),
                    reason: "storage services do not run jobs".into(),
                });
                let answer = Message::Compute(ComputeMessage::SubmitJobReply { result });
                if let Err(cause) = reply.put(answer).await {
                    tracing::debug!(%cause, "submitter is gone");
                }
                true
            }
            Message::Control(ControlMessage::Stop { reply, .. }) => {
                let answer =
                    Message::Control(ControlMessage::Stopped { service: self.ctx.name.clone() });
                if let Err(cause) = reply.put(answer).await {
                    tracing::debug!(%cause, "stopper is gone");
                }
                false
            }
            other => {
                tracing::warn!(service = %self.ctx.name, msg = other.name(), "unexpected message");
                true
            }
        }
    }
}

#[async_trait::async_trait]
impl Service for SimpleStorageService {
    fn ctx(&self) -> &ServiceCtx {
        &self.ctx
    }

    fn ctx_mut(&mut self) -> &mut ServiceCtx {
        &mut self.ctx
    }

    fn kind(&self) -> ServiceKind {
        ServiceKind::Storage
    }

    async fn main(&mut self) -> u8 {
        // Rebuild the ledger from the platform: a restarted storage starts
        // empty at full capacity.
        self.free = self.capacity;
        self.files.clear();
        tracing::info!(
            service = %self.ctx.name,
            mount = %self.mount,
            capacity = self.capacity,
            scratch = self.is_scratch,
            "storage service up"
        );
        loop {
            let msg = match self.ctx.commport.get(None).await {
                Ok(msg) => msg,
                Err(_) => break,
            };
            if !self.handle_message(msg).await {
                break;
            }
        }
        0
    }
}

#[cfg(test)]
#[path = "simple_tests.rs"]
mod tests;
