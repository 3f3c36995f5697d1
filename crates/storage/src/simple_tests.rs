// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::client::StorageClient;
use dr_core::PropertyBag;
use dr_engine::Simulation;
use dr_platform::{HostSpec, Platform};
use dr_wire::{request, ComputeMessage, Message};

fn platform() -> Platform {
    Platform::builder()
        .host(
            "h1",
            HostSpec::new(1e9, 4, 1024)
                .disk("/data", 10_000, 100.0, 100.0)
                .disk("/fast", 10_000, 1000.0, 1000.0),
        )
        .build()
}

fn start_storage(sim: &Simulation, name: &str, mount: &str) -> StorageClient {
    start_storage_with(sim, name, mount, PropertyBag::new())
}

fn start_storage_with(
    sim: &Simulation,
    name: &str,
    mount: &str,
    props: PropertyBag,
) -> StorageClient {
    let ctx = sim.service_ctx(name, "h1", props);
    let storage = SimpleStorageService::new(ctx, mount).unwrap();
    sim.launch(storage, false);
    StorageClient::new(sim.clone(), name)
}

#[tokio::test(start_paused = true)]
async fn write_read_delete_round_trip() {
    let sim = Simulation::new(platform());
    let store = start_storage(&sim, "store", "/data");
    let clock = sim.clock().clone();

    let file = dr_core::DataFile::new("f1", 1000);
    let loc = store.location("/data", file.clone());

    // 1000 B at 100 B/s.
    store.write(&loc).await.unwrap();
    assert!((clock.now() - 10.0).abs() < 0.01);
    assert_eq!(store.free_space().await.unwrap(), 9_000);

    let bytes = store.read(&loc).await.unwrap();
    assert_eq!(bytes, 1000);
    assert!((clock.now() - 20.0).abs() < 0.01);

    store.delete(&loc).await.unwrap();
    assert_eq!(store.free_space().await.unwrap(), 10_000);
    assert_eq!(store.read(&loc).await.unwrap_err().label(), "file_not_found");
}

#[tokio::test(start_paused = true)]
async fn unknown_mount_is_rejected_at_construction() {
    let sim = Simulation::new(platform());
    let ctx = sim.service_ctx("store", "h1", PropertyBag::new());
    assert!(SimpleStorageService::new(ctx, "/missing").is_err());
}

#[tokio::test(start_paused = true)]
async fn write_beyond_capacity_fails_without_partial_state() {
    let sim = Simulation::new(platform());
    let store = start_storage(&sim, "store", "/data");

    let big = dr_core::DataFile::new("big", 20_000);
    let loc = store.location("/", big.clone());
    let err = store.write(&loc).await.unwrap_err();
    assert_eq!(err.label(), "not_enough_space");
    assert_eq!(store.free_space().await.unwrap(), 10_000);
    assert!(store.lookup(&big).await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn overwrite_reclaims_the_old_bytes() {
    let sim = Simulation::new(platform());
    let store = start_storage(&sim, "store", "/data");

    let file = dr_core::DataFile::new("f", 8_000);
    let loc = store.location("/", file.clone());
    store.write(&loc).await.unwrap();
    assert_eq!(store.free_space().await.unwrap(), 2_000);

    // Same path again: the old copy is replaced, not leaked.
    store.write(&loc).await.unwrap();
    assert_eq!(store.free_space().await.unwrap(), 2_000);
}

#[tokio::test(start_paused = true)]
async fn partial_reads_cost_only_the_bytes_requested() {
    let sim = Simulation::new(platform());
    let store = start_storage(&sim, "store", "/data");
    let clock = sim.clock().clone();

    let file = dr_core::DataFile::new("f", 1000);
    let loc = store.location("/", file);
    store.write(&loc).await.unwrap();

    let start = clock.now();
    let bytes = dr_engine::rpc::file_read(&sim, &loc, Some(100), None).await.unwrap();
    assert_eq!(bytes, 100);
    assert!((clock.now() - start - 1.0).abs() < 0.01);
}

#[tokio::test(start_paused = true)]
async fn bufferized_transfers_move_buffer_by_buffer() {
    let sim = Simulation::new(platform());
    // 250 B buffers: a 1000 B transfer is four chunks.
    let props = PropertyBag::new().with(BUFFER_SIZE, "250");
    let store = start_storage_with(&sim, "store", "/data", props);
    let clock = sim.clock().clone();

    let file = dr_core::DataFile::new("f1", 1000);
    let loc = store.location("/data", file.clone());

    // The per-buffer suspensions account the same total disk time.
    store.write(&loc).await.unwrap();
    assert!((clock.now() - 10.0).abs() < 0.01);

    let bytes = store.read(&loc).await.unwrap();
    assert_eq!(bytes, 1000);
    assert!((clock.now() - 20.0).abs() < 0.01);

    // Partial reads are chunked too, costing only the bytes requested.
    let partial = dr_engine::rpc::file_read(&sim, &loc, Some(300), None).await.unwrap();
    assert_eq!(partial, 300);
    assert!((clock.now() - 23.0).abs() < 0.01);
}

#[tokio::test(start_paused = true)]
async fn bad_buffer_size_falls_back_to_non_bufferized() {
    let sim = Simulation::new(platform());
    let props = PropertyBag::new().with(BUFFER_SIZE, "lots");
    let store = start_storage_with(&sim, "store", "/data", props);
    let clock = sim.clock().clone();

    let file = dr_core::DataFile::new("f1", 500);
    let loc = store.location("/", file);
    store.write(&loc).await.unwrap();
    assert!((clock.now() - 5.0).abs() < 0.01);
}

#[tokio::test(start_paused = true)]
async fn copy_pulls_from_the_source_storage() {
    let sim = Simulation::new(platform());
    let slow = start_storage(&sim, "slow", "/data");
    let fast = start_storage(&sim, "fast", "/fast");
    let clock = sim.clock().clone();

    let file = dr_core::DataFile::new("f", 1000);
    let src = slow.location("/", file.clone());
    let dst = fast.location("/", file.clone());
    slow.write(&src).await.unwrap();

    let start = clock.now();
    fast.copy_to(&src, &dst).await.unwrap();
    // 10 s read at the source plus 1 s write at the destination.
    assert!((clock.now() - start - 11.0).abs() < 0.01);
    assert_eq!(fast.read(&dst).await.unwrap(), 1000);
    assert_eq!(slow.lookup(&file).await.unwrap().len(), 1);
    assert_eq!(fast.lookup(&file).await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn copy_of_a_missing_source_fails() {
    let sim = Simulation::new(platform());
    let slow = start_storage(&sim, "slow", "/data");
    let fast = start_storage(&sim, "fast", "/fast");

    let file = dr_core::DataFile::new("ghost", 10);
    let src = slow.location("/", file.clone());
    let dst = fast.location("/", file);
    let err = fast.copy_to(&src, &dst).await.unwrap_err();
    assert_eq!(err.label(), "file_not_found");
}

#[tokio::test(start_paused = true)]
async fn last_write_date_tracks_the_latest_write() {
    let sim = Simulation::new(platform());
    let store = start_storage(&sim, "store", "/data");
    let clock = sim.clock().clone();

    let file = dr_core::DataFile::new("f", 100);
    let loc = store.location("/", file.clone());
    store.write(&loc).await.unwrap();
    let first = store.last_write_date(&file).await.unwrap();

    clock.sleep(50.0).await;
    store.write(&loc).await.unwrap();
    let second = store.last_write_date(&file).await.unwrap();
    assert!(second > first + 49.0);

    let unknown = dr_core::DataFile::new("ghost", 1);
    assert_eq!(store.last_write_date(&unknown).await.unwrap_err().label(), "file_not_found");
}

#[tokio::test(start_paused = true)]
async fn job_submission_is_not_allowed() {
    let sim = Simulation::new(platform());
    start_storage(&sim, "store", "/data");

    let job = dr_core::CompoundJob::new("j1");
    let endpoint = sim.endpoint_of("store").unwrap();
    let notify = sim.fabric().commport("notify");
    let reply = request(sim.fabric(), &endpoint, Some(10.0), |reply| {
        Message::Compute(ComputeMessage::SubmitJob {
            job: dr_core::JobPayload::Compound(job),
            args: Default::default(),
            notify: notify.endpoint(),
            reply,
        })
    })
    .await
    .unwrap();
    match reply {
        Message::Compute(ComputeMessage::SubmitJobReply { result }) => {
            assert_eq!(result.unwrap_err().label(), "not_allowed");
        }
        other => panic!("unexpected message {}", other.name()),
    }
}

#[tokio::test(start_paused = true)]
async fn load_reports_zero_for_serialized_disks() {
    let sim = Simulation::new(platform());
    let store = start_storage(&sim, "store", "/data");
    assert_eq!(store.load().await.unwrap(), 0.0);
}
