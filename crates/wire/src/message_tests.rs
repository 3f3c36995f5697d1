// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::fabric::Fabric;
use dr_core::{DataFile, FileLocation};

fn location(bytes: u64) -> FileLocation {
    FileLocation::new("store", "/", DataFile::new("f", bytes))
}

#[test]
fn control_messages_cost_the_fixed_overhead() {
    let msg = Message::Control(ControlMessage::HostStateChanged { host: "h".into(), on: true });
    assert_eq!(msg.payload_bytes(), CONTROL_MESSAGE_BYTES);
}

#[test]
fn write_requests_ship_the_file_bytes() {
    let fabric = Fabric::default();
    let reply = fabric.temporary().endpoint();
    let msg = Message::Storage(StorageMessage::Write { location: location(5000), reply });
    assert_eq!(msg.payload_bytes(), CONTROL_MESSAGE_BYTES + 5000);
}

#[test]
fn read_replies_ship_the_bytes_back() {
    let msg = Message::Storage(StorageMessage::ReadReply { result: Ok(4096) });
    assert_eq!(msg.payload_bytes(), CONTROL_MESSAGE_BYTES + 4096);
}

#[test]
fn failed_read_replies_cost_only_the_overhead() {
    let msg = Message::Storage(StorageMessage::ReadReply {
        result: Err(dr_core::FailureCause::FileNotFound { location: location(4096) }),
    });
    assert_eq!(msg.payload_bytes(), CONTROL_MESSAGE_BYTES);
}

#[yare::parameterized(
    read   = { "storage:read" },
    lookup = { "storage:lookup" },
)]
fn storage_message_names(expected: &str) {
    let fabric = Fabric::default();
    let reply = fabric.temporary().endpoint();
    let msg = match expected {
        "storage:read" => {
            Message::Storage(StorageMessage::Read { location: location(1), num_bytes: None, reply })
        }
        _ => Message::Storage(StorageMessage::Lookup { file: DataFile::new("f", 1), reply }),
    };
    assert_eq!(msg.name(), expected);
}

#[test]
fn run_spec_defaults_to_no_constraints() {
    let spec = RunSpec::default();
    assert!(spec.host.is_none());
    assert!(spec.num_cores.is_none());
}

#[test]
fn resource_information_sums_idle_cores() {
    let info = ResourceInformation {
        hosts: vec![
            HostResourceInfo {
                host: "h1".into(),
                total_cores: 8,
                idle_cores: 3,
                total_ram: 1024,
                ram_available: 512,
                speed: 1e9,
                on: true,
            },
            HostResourceInfo {
                host: "h2".into(),
                total_cores: 4,
                idle_cores: 4,
                total_ram: 1024,
                ram_available: 1024,
                speed: 1e9,
                on: true,
            },
        ],
    };
    assert_eq!(info.total_idle_cores(), 7);
}
