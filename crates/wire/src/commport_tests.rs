// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::fabric::Fabric;
use crate::message::{ControlMessage, Message};
use dr_core::{HostName, SimClock};

fn host_state(host: &str, on: bool) -> Message {
    Message::Control(ControlMessage::HostStateChanged { host: HostName::new(host), on })
}

fn host_of(msg: &Message) -> String {
    match msg {
        Message::Control(ControlMessage::HostStateChanged { host, .. }) => host.to_string(),
        other => panic!("unexpected message {}", other.name()),
    }
}

#[tokio::test(start_paused = true)]
async fn put_then_get_delivers() {
    let fabric = Fabric::default();
    let mut port = fabric.commport("svc");
    port.endpoint().put(host_state("h1", true)).await.unwrap();

    let msg = port.get(None).await.unwrap();
    assert_eq!(host_of(&msg), "h1");
}

#[tokio::test(start_paused = true)]
async fn delivery_is_fifo_per_sender() {
    let fabric = Fabric::default();
    let mut port = fabric.commport("svc");
    let endpoint = port.endpoint();
    for i in 0..5 {
        endpoint.put(host_state(&format!("h{i}"), true)).await.unwrap();
    }
    for i in 0..5 {
        let msg = port.get(None).await.unwrap();
        assert_eq!(host_of(&msg), format!("h{i}"));
    }
}

#[tokio::test(start_paused = true)]
async fn get_times_out() {
    let fabric = Fabric::default();
    let mut port = fabric.commport("svc");
    let clock = SimClock::new();

    let err = port.get(Some(5.0)).await.unwrap_err();
    assert_eq!(err.label(), "network_timeout");
    assert!((clock.now() - 5.0).abs() < 0.01);
}

#[tokio::test(start_paused = true)]
async fn put_to_dropped_port_is_a_network_error() {
    let fabric = Fabric::default();
    let port = fabric.commport("svc");
    let endpoint = port.endpoint();
    drop(port);

    let err = endpoint.put(host_state("h1", true)).await.unwrap_err();
    assert_eq!(err.label(), "network_error");
}

#[tokio::test(start_paused = true)]
async fn dput_delivers_without_blocking_the_sender() {
    let fabric = Fabric::default();
    let mut port = fabric.commport("svc");
    port.endpoint().dput(host_state("h1", false));

    let msg = port.get(Some(1.0)).await.unwrap();
    assert_eq!(host_of(&msg), "h1");
}

#[tokio::test(start_paused = true)]
async fn transfer_time_is_accounted() {
    // 1 KiB control payload over a 1 KiB/s link with 1s latency.
    let fabric = Fabric::new(LinkProfile::new(1024.0, 1.0), 16);
    let mut port = fabric.commport("svc");
    let clock = SimClock::new();

    port.endpoint().put(host_state("h1", true)).await.unwrap();
    assert!((clock.now() - 2.0).abs() < 0.01);
    port.get(None).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn get_race_returns_the_first_arrival() {
    let fabric = Fabric::default();
    let mut a = fabric.commport("a");
    let mut b = fabric.commport("b");

    let b_endpoint = b.endpoint();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        b_endpoint.put(host_state("via_b", true)).await
    });

    let msg = a.get_race(&mut b, Some(10.0)).await.unwrap();
    assert_eq!(host_of(&msg), "via_b");
}

#[tokio::test(start_paused = true)]
async fn get_race_times_out() {
    let fabric = Fabric::default();
    let mut a = fabric.commport("a");
    let mut b = fabric.commport("b");

    let err = a.get_race(&mut b, Some(2.0)).await.unwrap_err();
    assert_eq!(err.label(), "network_timeout");
}

#[tokio::test(start_paused = true)]
async fn temporary_ports_have_unique_names() {
    let fabric = Fabric::default();
    let a = fabric.temporary();
    let b = fabric.temporary();
    assert_ne!(a.name(), b.name());
    assert!(a.name().starts_with("tmp-"));
}

#[tokio::test(start_paused = true)]
async fn request_retries_are_bounded() {
    let fabric = Fabric::default();
    // Keep the receiving half alive but never answer.
    let silent = fabric.commport("silent");
    let clock = SimClock::new();

    let err = crate::message::request_with_retries(&fabric, &silent.endpoint(), 5.0, 3, |reply| {
        Message::Control(ControlMessage::Suspend { reply })
    })
    .await
    .unwrap_err();

    assert_eq!(err.label(), "network_timeout");
    assert!((clock.now() - 15.0).abs() < 0.01, "three 5s attempts");
}

#[tokio::test(start_paused = true)]
async fn request_reply_round_trip() {
    let fabric = Fabric::default();
    let mut svc = fabric.commport("svc");
    let svc_endpoint = svc.endpoint();

    let server = tokio::spawn(async move {
        match svc.get(None).await.unwrap() {
            Message::Control(ControlMessage::Suspend { reply }) => {
                reply
                    .put(Message::Control(ControlMessage::Suspended { service: "svc".into() }))
                    .await
                    .unwrap();
            }
            other => panic!("unexpected message {}", other.name()),
        }
    });

    let reply = crate::message::request(&fabric, &svc_endpoint, Some(10.0), |reply| {
        Message::Control(ControlMessage::Suspend { reply })
    })
    .await
    .unwrap();

    assert!(matches!(reply, Message::Control(ControlMessage::Suspended { .. })));
    server.await.unwrap();
}
