// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use dr_core::FailureCause;
use dr_wire::Fabric;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn entry(fabric: &Fabric, name: &str, kind: ServiceKind) -> RegistryEntry {
    RegistryEntry {
        endpoint: fabric.commport(name).endpoint(),
        state: ServiceState::Up,
        kind,
        support: JobSupport::standard_only(),
        scratch: None,
        kill: CancellationToken::new(),
        daemon_lock: Arc::new(Mutex::new(())),
    }
}

#[tokio::test(start_paused = true)]
async fn register_and_resolve() {
    let fabric = Fabric::default();
    let registry = ServiceRegistry::default();
    registry.register("bm1".into(), entry(&fabric, "bm1", ServiceKind::Compute));

    assert_eq!(registry.state("bm1"), Some(ServiceState::Up));
    assert!(registry.assert_up("bm1").is_ok());
    assert!(registry.entry("bm1").unwrap().support.standard);
}

#[tokio::test(start_paused = true)]
async fn down_services_answer_service_is_down() {
    let fabric = Fabric::default();
    let registry = ServiceRegistry::default();
    registry.register("bm1".into(), entry(&fabric, "bm1", ServiceKind::Compute));
    registry.set_state("bm1", ServiceState::Down);

    match registry.assert_up("bm1") {
        Err(FailureCause::ServiceIsDown { service }) => assert_eq!(service, "bm1"),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn unknown_services_are_a_network_error() {
    let registry = ServiceRegistry::default();
    match registry.assert_up("ghost") {
        Err(FailureCause::NetworkError { endpoint }) => assert_eq!(endpoint, "ghost"),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn suspended_services_still_resolve() {
    let fabric = Fabric::default();
    let registry = ServiceRegistry::default();
    registry.register("aes".into(), entry(&fabric, "aes", ServiceKind::Helper));
    registry.set_state("aes", ServiceState::Suspended);
    assert!(registry.assert_up("aes").is_ok());
}

#[tokio::test(start_paused = true)]
async fn services_of_kind_filters() {
    let fabric = Fabric::default();
    let registry = ServiceRegistry::default();
    registry.register("bm1".into(), entry(&fabric, "bm1", ServiceKind::Compute));
    registry.register("st1".into(), entry(&fabric, "st1", ServiceKind::Storage));

    let compute = registry.services_of_kind(ServiceKind::Compute);
    assert_eq!(compute.len(), 1);
    assert_eq!(compute[0], "bm1");
}
