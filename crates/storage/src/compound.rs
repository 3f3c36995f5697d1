// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Compound storage service.
//!
//! Aggregates physical storage services behind one logical endpoint. The
//! allocation of each file is produced by a pluggable selector; stripes
//! are forwarded to the members concurrently, and a partial write failure
//! rolls back the parts already written (best-effort) before reporting
//! the original cause.

use crate::allocator::{round_robin_selector, AllocationMap, StorageSelector};
use dr_core::{DataFile, FailureCause, FileLocation, ServiceName, SimResult};
use dr_engine::registry::ServiceKind;
use dr_engine::rpc;
use dr_engine::service::{Service, ServiceCtx};
use dr_wire::{ComputeMessage, ControlMessage, Message, StorageMessage};
use indexmap::IndexMap;

/// Stripe bound in bytes when striping is enabled.
pub const MAX_ALLOCATION_CHUNK_SIZE: &str = "MAX_ALLOCATION_CHUNK_SIZE";
/// `true`: split files into chunk-sized stripes across members.
pub const INTERNAL_STRIPING: &str = "INTERNAL_STRIPING";

/// A virtual storage endpoint over a non-empty set of physical storages.
pub struct CompoundStorageService {
    ctx: ServiceCtx,
    members: Vec<ServiceName>,
    selector: StorageSelector,
    allocations: AllocationMap,
}

impl std::fmt::Debug for CompoundStorageService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompoundStorageService").field("members", &self.members).finish()
    }
}

impl CompoundStorageService {
    /// Build a compound storage over `members` with the reference
    /// round-robin allocator configured from the property bag. A compound
    /// storage can never be a scratch space.
    pub fn new(
        ctx: ServiceCtx,
        members: Vec<ServiceName>,
        is_scratch: bool,
    ) -> SimResult<Self> {
        if is_scratch {
            return Err(FailureCause::NotAllowed {
                service: ctx.name.clone(),
                reason: "a compound storage cannot be a scratch space".into(),
            });
        }
        if members.is_empty() {
            return Err(FailureCause::NotAllowed {
                service: ctx.name.clone(),
                reason: "a compound storage needs at least one member".into(),
            });
        }
        let striping = ctx.properties.get_bool(INTERNAL_STRIPING, false).unwrap_or(false);
        let chunk = match ctx.properties.get_u64(MAX_ALLOCATION_CHUNK_SIZE, 0) {
            Ok(0) => None,
            Ok(chunk) => Some(chunk),
            Err(e) => {
                tracing::warn!(service = %ctx.name, %e, "bad chunk size, striping disabled");
                None
            }
        };
        let selector = round_robin_selector(striping, chunk);
        Ok(Self { ctx, members, selector, allocations: AllocationMap::new() })
    }

    /// Replace the allocator.
    pub fn with_selector(mut self, selector: StorageSelector) -> Self {
        self.selector = selector;
        self
    }

    /// Free bytes per member, in member declaration order.
    async fn member_resources(&self) -> IndexMap<ServiceName, u64> {
        let sim = self.ctx.sim().clone();
        let mut resources = IndexMap::new();
        for member in &self.members {
            match rpc::free_space(&sim, member.as_str(), None).await {
                Ok(bytes) => {
                    resources.insert(member.clone(), bytes);
                }
                Err(cause) => {
                    tracing::warn!(member = %member, %cause, "member unreachable, skipping");
                }
            }
        }
        resources
    }

    fn not_enough_space(&self, file: &DataFile) -> FailureCause {
        FailureCause::StorageServiceNotEnoughSpace {
            file: file.clone(),
            storage: self.ctx.name.clone(),
        }
    }

    /// Allocate stripes for `file`, or reuse the existing allocation on
    /// overwrite.
    async fn allocate(&mut self, file: &DataFile) -> SimResult<Vec<FileLocation>> {
        if let Some(existing) = self.allocations.get(file.id()) {
            return Ok(existing.clone());
        }
        let resources = self.member_resources().await;
        let stripes = (self.selector)(file, &resources, &self.allocations, &[]);
        if stripes.is_empty() {
            return Err(self.not_enough_space(file));
        }
        debug_assert_eq!(
            stripes.iter().map(|s| s.file().size()).sum::<u64>(),
            file.size(),
            "stripe sizes must sum to the file size"
        );
        Ok(stripes)
    }

    /// Delete already-written stripes after a partial failure.
    /// Best-effort: rollback failures are logged, never surfaced.
    async fn rollback(&self, written: &[FileLocation]) {
        let sim = self.ctx.sim().clone();
        for stripe in written {
            if let Err(cause) = rpc::file_delete(&sim, stripe, None).await {
                tracing::warn!(stripe = %stripe, %cause, "rollback delete failed");
            }
        }
    }

    async fn handle_write(&mut self, location: FileLocation) -> SimResult<()> {
        let file = location.file().clone();
        let stripes = self.allocate(&file).await?;
        let sim = self.ctx.sim().clone();

        let writes = stripes.iter().map(|stripe| rpc::file_write(&sim, stripe, None));
        let results = futures::future::join_all(writes).await;

        if let Some(first_failure) =
            results.iter().find_map(|r| r.as_ref().err().cloned())
        {
            let written: Vec<FileLocation> = stripes
                .iter()
                .zip(&results)
                .filter(|(_, r)| r.is_ok())
                .map(|(s, _)| s.clone())
                .collect();
            self.rollback(&written).await;
            return Err(first_failure);
        }

        tracing::info!(
            service = %self.ctx.name,
            file = %file,
            stripes = stripes.len(),
            "file written across members"
        );
        self.allocations.insert(file.id().to_string(), stripes);
        Ok(())
    }

    async fn handle_read(
        &mut self,
        location: &FileLocation,
        num_bytes: Option<u64>,
    ) -> SimResult<u64> {
        let file = location.file();
        let Some(stripes) = self.allocations.get(file.id()).cloned() else {
            return Err(FailureCause::FileNotFound { location: location.clone() });
        };
        let sim = self.ctx.sim().clone();
        let total: u64 = stripes.iter().map(|s| s.file().size()).sum();
        let mut remaining = num_bytes.map_or(total, |n| n.min(total));
        let mut delivered = 0;
        // Stripe order delivery: reads run sequentially over the stripes.
        for stripe in &stripes {
            if remaining == 0 {
                break;
            }
            let take = stripe.file().size().min(remaining);
            delivered += rpc::file_read(&sim, stripe, Some(take), None).await?;
            remaining -= take;
        }
        Ok(delivered)
    }

    /// Copy with this compound storage as the destination: allocate, then
    /// pull each stripe's bytes from the source and write it, with
    /// rollback on failure.
    async fn handle_copy(&mut self, src: FileLocation, dst: FileLocation) -> SimResult<()> {
        if src.service() == &self.ctx.name {
            return Err(FailureCause::NotAllowed {
                service: self.ctx.name.clone(),
                reason: "copy out of a compound storage is initiated by the destination".into(),
            });
        }
        let file = dst.file().clone();
        let stripes = self.allocate(&file).await?;
        let sim = self.ctx.sim().clone();

        let mut written: Vec<FileLocation> = Vec::new();
        for stripe in &stripes {
            let take = stripe.file().size();
            let result = match rpc::file_read(&sim, &src, Some(take), None).await {
                Ok(_) => rpc::file_write(&sim, stripe, None).await,
                Err(cause) => Err(cause),
            };
            if let Err(cause) = result {
                self.rollback(&written).await;
                return Err(cause);
            }
            written.push(stripe.clone());
        }
        self.allocations.insert(file.id().to_string(), stripes);
        Ok(())
    }

    async fn handle_delete(&mut self, location: &FileLocation) -> SimResult<()> {
        let file = location.file();
        let Some(stripes) = self.allocations.get(file.id()).cloned() else {
            return Err(FailureCause::FileNotFound { location: location.clone() });
        };
        let sim = self.ctx.sim().clone();
        for stripe in &stripes {
            rpc::file_delete(&sim, stripe, None).await?;
        }
        self.allocations.remove(file.id());
        Ok(())
    }

    fn lookup(&self, file: &DataFile) -> Vec<FileLocation> {
        self.allocations.get(file.id()).cloned().unwrap_or_default()
    }

    async fn total_free_space(&self) -> u64 {
        self.member_resources().await.values().sum()
    }

    async fn last_write_date(&self, file: &DataFile) -> SimResult<f64> {
        let Some(stripes) = self.allocations.get(file.id()).cloned() else {
            return Err(FailureCause::FileNotFound {
                location: FileLocation::new(self.ctx.name.clone(), "/", file.clone()),
            });
        };
        let sim = self.ctx.sim().clone();
        let mut latest = f64::MIN;
        for stripe in &stripes {
            let date =
                rpc::last_write_date(&sim, stripe.service().as_str(), stripe.file(), None).await?;
            latest = latest.max(date);
        }
        Ok(latest)
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
                let bytes = self.total_free_space().await;
                let answer = Message::Storage(StorageMessage::FreeSpaceReply { bytes });
                if let Err(cause) = reply.put(answer).await {
                    tracing::debug!(%cause, "requester is gone");
                }
                true
            }
            Message::Storage(StorageMessage::LastWriteDate { file, reply }) => {
                let result = self.last_write_date(&file).await;
                let answer = Message::Storage(StorageMessage::LastWriteDateReply { result });
                if let Err(cause) = reply.put(answer).await {
                    tracing::debug!(%cause, "requester is gone");
                }
                true
            }
            Message::Storage(StorageMessage::Load { reply }) => {
                let result = Err(FailureCause::FunctionalityNotAvailable {
                    service: self.ctx.name.clone(),
                    functionality: "get_load".into(),
                });
                let answer = Message::Storage(StorageMessage::LoadReply { result });
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
impl Service for CompoundStorageService {
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
        self.allocations.clear();
        tracing::info!(
            service = %self.ctx.name,
            members = self.members.len(),
            "compound storage service up"
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
#[path = "compound_tests.rs"]
mod tests;
