// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Compound storage scenarios: striped writes and rollback.

use dr_core::{DataFile, PropertyBag};
use dr_engine::Simulation;
use dr_platform::{HostSpec, Platform};
use dr_storage::{
    CompoundStorageService, SimpleStorageService, StorageClient, INTERNAL_STRIPING,
    MAX_ALLOCATION_CHUNK_SIZE,
};

fn storage_platform() -> Platform {
    Platform::builder()
        .host(
            "h1",
            HostSpec::new(1e9, 4, 1024)
                .disk("/small", 510, 1e6, 1e6)
                .disk("/large", 1000, 1e6, 1e6),
        )
        .build()
}

/// CSS over a 510 B and a 1000 B disk with 400 B striping.
fn start_css(sim: &Simulation) -> StorageClient {
    for (name, mount) in [("small", "/small"), ("large", "/large")] {
        let ctx = sim.service_ctx(name, "h1", PropertyBag::new());
        #[allow(clippy::unwrap_used)]
        let storage = SimpleStorageService::new(ctx, mount).unwrap();
        sim.launch(storage, false);
    }
    let props = PropertyBag::new()
        .with(INTERNAL_STRIPING, "true")
        .with(MAX_ALLOCATION_CHUNK_SIZE, "400");
    let ctx = sim.service_ctx("css", "h1", props);
    #[allow(clippy::unwrap_used)]
    let css = CompoundStorageService::new(ctx, vec!["small".into(), "large".into()], false)
        .unwrap();
    sim.launch(css, false);
    StorageClient::new(sim.clone(), "css")
}

#[tokio::test(start_paused = true)]
async fn striped_write_lands_largest_disk_first() {
    let sim = Simulation::new(storage_platform());
    let css = start_css(&sim);

    let file = DataFile::new("f500", 500);
    let location = css.location("/", file.clone());
    css.write(&location).await.unwrap();

    let stripes = css.lookup(&file).await.unwrap();
    assert_eq!(stripes.len(), 2, "500 B over a 400 B chunk is two stripes");
    assert_eq!(stripes[0].service(), "large");
    assert_eq!(stripes[0].file().size(), 400);
    assert_eq!(stripes[1].service(), "small");
    assert_eq!(stripes[1].file().size(), 100);
    assert_eq!(
        stripes.iter().map(|s| s.file().size()).sum::<u64>(),
        file.size(),
        "stripe sizes sum to the file size"
    );

    // Total CSS free space decreased by exactly the file size.
    assert_eq!(css.free_space().await.unwrap(), 510 + 1000 - 500);

    // Read-after-write holds.
    assert_eq!(css.read(&location).await.unwrap(), 500);
}

#[tokio::test(start_paused = true)]
async fn unplaceable_write_fails_and_leaves_no_trace() {
    let sim = Simulation::new(storage_platform());
    let css = start_css(&sim);

    let file = DataFile::new("f1500", 1500);
    let location = css.location("/", file.clone());
    let err = css.write(&location).await.unwrap_err();
    assert_eq!(err.label(), "not_enough_space");

    assert_eq!(css.free_space().await.unwrap(), 1510);
    assert!(css.lookup(&file).await.unwrap().is_empty());
    assert_eq!(css.read(&location).await.unwrap_err().label(), "file_not_found");
}

#[tokio::test(start_paused = true)]
async fn delete_restores_the_free_space() {
    let sim = Simulation::new(storage_platform());
    let css = start_css(&sim);

    let file = DataFile::new("f500", 500);
    let location = css.location("/", file.clone());
    css.write(&location).await.unwrap();
    css.delete(&location).await.unwrap();

    assert_eq!(css.free_space().await.unwrap(), 1510);
    assert_eq!(css.read(&location).await.unwrap_err().label(), "file_not_found");
}
