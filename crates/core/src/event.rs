// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution events delivered on the controller's event bus.
//!
//! Each event carries just enough context (job or file-location handles)
//! for a controller to continue. Delivery order is the order events were
//! enqueued on the controller's commport; concurrent producers interleave.

use crate::data::FileLocation;
use crate::failure::FailureCause;
use crate::job::{CompoundJob, PilotJob, StandardJob};
use crate::names::ServiceName;

/// A job lifecycle, file operation, timer, or custom notification.
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    StandardJobCompleted { job: StandardJob },
    StandardJobFailed { job: StandardJob, cause: FailureCause },
    CompoundJobCompleted { job: CompoundJob },
    CompoundJobFailed { job: CompoundJob, cause: FailureCause },
    PilotJobStarted { job: PilotJob, compute_service: ServiceName },
    PilotJobExpired { job: PilotJob },
    FileCopyCompleted { src: FileLocation, dst: FileLocation },
    FileCopyFailed { src: FileLocation, dst: FileLocation, cause: FailureCause },
    FileReadCompleted { location: FileLocation },
    FileReadFailed { location: FileLocation, cause: FailureCause },
    FileWriteCompleted { location: FileLocation },
    FileWriteFailed { location: FileLocation, cause: FailureCause },
    TimerFired { tag: String },
    Custom { payload: serde_json::Value },
}

crate::simple_display! {
    ExecutionEvent {
        StandardJobCompleted { .. } => "standard_job:completed",
        StandardJobFailed { .. } => "standard_job:failed",
        CompoundJobCompleted { .. } => "compound_job:completed",
        CompoundJobFailed { .. } => "compound_job:failed",
        PilotJobStarted { .. } => "pilot_job:started",
        PilotJobExpired { .. } => "pilot_job:expired",
        FileCopyCompleted { .. } => "file_copy:completed",
        FileCopyFailed { .. } => "file_copy:failed",
        FileReadCompleted { .. } => "file_read:completed",
        FileReadFailed { .. } => "file_read:failed",
        FileWriteCompleted { .. } => "file_write:completed",
        FileWriteFailed { .. } => "file_write:failed",
        TimerFired { .. } => "timer:fired",
        Custom { .. } => "custom",
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
