// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn data_file_identity_is_the_id() {
    let a = DataFile::new("input.dat", 100);
    let b = DataFile::new("input.dat", 100);
    let c = DataFile::new("other.dat", 100);

    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(a.size(), 100);
}

#[test]
fn generated_files_are_unique() {
    let a = DataFile::generate(10);
    let b = DataFile::generate(10);
    assert_ne!(a, b);
}

#[test]
fn data_file_hashes_by_id() {
    let mut set = std::collections::HashSet::new();
    set.insert(DataFile::new("f", 1));
    assert!(set.contains(&DataFile::new("f", 1)));
    assert!(!set.contains(&DataFile::new("g", 1)));
}

#[test]
fn location_path_joins_prefix_and_id() {
    let file = DataFile::new("data.bin", 42);
    let loc = FileLocation::new("store", "/scratch", file);
    assert_eq!(loc.path(), "/scratch/data.bin");
}

#[test]
fn location_path_tolerates_trailing_slash() {
    let file = DataFile::new("data.bin", 42);
    let loc = FileLocation::new("store", "/scratch/", file);
    assert_eq!(loc.path(), "/scratch/data.bin");
}

#[test]
fn location_display_names_the_service() {
    let loc = FileLocation::new("css", "/", DataFile::new("f1", 1));
    assert_eq!(loc.to_string(), "css:/f1");
}

#[test]
fn with_file_keeps_service_and_prefix() {
    let loc = FileLocation::new("store", "/d", DataFile::new("whole", 500));
    let part = loc.with_file(DataFile::new("whole#p0", 400));
    assert_eq!(part.service(), loc.service());
    assert_eq!(part.prefix(), loc.prefix());
    assert_eq!(part.file().id(), "whole#p0");
    assert_eq!(part.file().size(), 400);
}
