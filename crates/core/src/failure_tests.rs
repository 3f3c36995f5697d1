// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::names::ServiceName;

fn svc(name: &str) -> ServiceName {
    ServiceName::new(name)
}

#[test]
fn display_names_the_service() {
    let cause = FailureCause::ServiceIsDown { service: svc("batch1") };
    assert_eq!(cause.to_string(), "service 'batch1' is down");
}

#[test]
fn display_names_the_file_and_storage() {
    let cause = FailureCause::StorageServiceNotEnoughSpace {
        file: DataFile::new("big.dat", 1500),
        storage: svc("css"),
    };
    assert_eq!(cause.to_string(), "not enough space on storage 'css' for file 'big.dat'");
}

#[yare::parameterized(
    down         = { FailureCause::ServiceIsDown { service: svc("s") }, "service_is_down" },
    unsupported  = { FailureCause::JobTypeNotSupported { job: "j".into(), service: svc("s") }, "job_type_not_supported" },
    no_resources = { FailureCause::NotEnoughResources { job: "j".into(), service: svc("s") }, "not_enough_resources" },
    killed       = { FailureCause::JobKilled { job: "j".into() }, "job_killed" },
    timeout      = { FailureCause::JobTimeout { job: "j".into() }, "job_timeout" },
    timeout_net  = { FailureCause::NetworkTimeout { endpoint: "e".into() }, "network_timeout" },
)]
fn label_matches_variant(cause: FailureCause, expected: &str) {
    assert_eq!(cause.label(), expected);
}

#[test]
fn termination_cause_maps_to_per_job_failures() {
    let service = svc("bm");
    assert_eq!(
        TerminationCause::ServiceTerminated.to_failure(&service, "j1"),
        FailureCause::ServiceIsDown { service: service.clone() }
    );
    assert_eq!(
        TerminationCause::JobKilled.to_failure(&service, "j1"),
        FailureCause::JobKilled { job: "j1".into() }
    );
    assert_eq!(
        TerminationCause::JobTimeout.to_failure(&service, "j1"),
        FailureCause::JobTimeout { job: "j1".into() }
    );
}

#[test]
fn causes_compare_by_value() {
    assert_eq!(
        FailureCause::NetworkError { endpoint: "e1".into() },
        FailureCause::NetworkError { endpoint: "e1".into() }
    );
    assert_ne!(
        FailureCause::NetworkError { endpoint: "e1".into() },
        FailureCause::NetworkTimeout { endpoint: "e1".into() }
    );
}
