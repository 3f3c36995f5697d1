// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-event-variant dispatch for controllers.
//!
//! Implement the handlers you care about; the rest default to no-ops that
//! log the event at debug level.

use dr_core::{
    CompoundJob, ExecutionEvent, FailureCause, FileLocation, PilotJob, ServiceName, StandardJob,
};

/// Virtual handlers for every event variant the bus carries.
#[async_trait::async_trait]
pub trait EventHandler: Send {
    async fn on_standard_job_completed(&mut self, _job: StandardJob) {}
    async fn on_standard_job_failed(&mut self, _job: StandardJob, _cause: FailureCause) {}
    async fn on_compound_job_completed(&mut self, _job: CompoundJob) {}
    async fn on_compound_job_failed(&mut self, _job: CompoundJob, _cause: FailureCause) {}
    async fn on_pilot_job_started(&mut self, _job: PilotJob, _compute_service: ServiceName) {}
    async fn on_pilot_job_expired(&mut self, _job: PilotJob) {}
    async fn on_file_copy_completed(&mut self, _src: FileLocation, _dst: FileLocation) {}
    async fn on_file_copy_failed(
        &mut self,
        _src: FileLocation,
        _dst: FileLocation,
        _cause: FailureCause,
    ) {
    }
    async fn on_file_read_completed(&mut self, _location: FileLocation) {}
    async fn on_file_read_failed(&mut self, _location: FileLocation, _cause: FailureCause) {}
    async fn on_file_write_completed(&mut self, _location: FileLocation) {}
    async fn on_file_write_failed(&mut self, _location: FileLocation, _cause: FailureCause) {}
    async fn on_timer(&mut self, _tag: String) {}
    async fn on_custom(&mut self, _payload: serde_json::Value) {}
}

/// Route one event to its handler method.
pub async fn dispatch(handler: &mut dyn EventHandler, event: ExecutionEvent) {
    tracing::debug!(event = %event, "dispatching event");
    match event {
        ExecutionEvent::StandardJobCompleted { job } => {
            handler.on_standard_job_completed(job).await
        }
        ExecutionEvent::StandardJobFailed { job, cause } => {
            handler.on_standard_job_failed(job, cause).await
        }
        ExecutionEvent::CompoundJobCompleted { job } => {
            handler.on_compound_job_completed(job).await
        }
        ExecutionEvent::CompoundJobFailed { job, cause } => {
            handler.on_compound_job_failed(job, cause).await
        }
        ExecutionEvent::PilotJobStarted { job, compute_service } => {
            handler.on_pilot_job_started(job, compute_service).await
        }
        ExecutionEvent::PilotJobExpired { job } => handler.on_pilot_job_expired(job).await,
        ExecutionEvent::FileCopyCompleted { src, dst } => {
            handler.on_file_copy_completed(src, dst).await
        }
        ExecutionEvent::FileCopyFailed { src, dst, cause } => {
            handler.on_file_copy_failed(src, dst, cause).await
        }
        ExecutionEvent::FileReadCompleted { location } => {
            handler.on_file_read_completed(location).await
        }
        ExecutionEvent::FileReadFailed { location, cause } => {
            handler.on_file_read_failed(location, cause).await
        }
        ExecutionEvent::FileWriteCompleted { location } => {
            handler.on_file_write_completed(location).await
        }
        ExecutionEvent::FileWriteFailed { location, cause } => {
            handler.on_file_write_failed(location, cause).await
        }
        ExecutionEvent::TimerFired { tag } => handler.on_timer(tag).await,
        ExecutionEvent::Custom { payload } => handler.on_custom(payload).await,
    }
}
