// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Named, bounded mailboxes for typed messages.
//!
//! A [`Commport`] is the receiving half owned by exactly one daemon; an
//! [`Endpoint`] is its cloneable address. Delivery is FIFO per
//! sender→receiver pair. `put` accounts the simulated transfer time of the
//! message payload before delivery; `get` supports timed receives.

use crate::fabric::LinkProfile;
use crate::message::Message;
use dr_core::{FailureCause, SimResult};
use futures::future::{select, Either};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Cloneable address of a commport.
#[derive(Clone)]
pub struct Endpoint {
    name: Arc<str>,
    tx: mpsc::Sender<Message>,
    profile: LinkProfile,
}

impl Endpoint {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Deliver `msg`, blocking for the simulated transfer time and for
    /// mailbox space. Fails with `NetworkError` when the receiving daemon
    /// is gone.
    pub async fn put(&self, msg: Message) -> SimResult<()> {
        let delay = self.profile.transfer_delay(msg.payload_bytes());
        if delay > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(delay)).await;
        }
        self.tx
            .send(msg)
            .await
            .map_err(|_| FailureCause::NetworkError { endpoint: self.name.to_string() })
    }

    /// Fire-and-forget `put`. The transfer is still accounted; a delivery
    /// failure is logged and dropped.
    pub fn dput(&self, msg: Message) {
        let endpoint = self.clone();
        tokio::spawn(async move {
            if let Err(cause) = endpoint.put(msg).await {
                tracing::debug!(endpoint = endpoint.name(), %cause, "dput delivery failed");
            }
        });
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Endpoint({})", self.name)
    }
}

/// The receiving half of a named mailbox.
pub struct Commport {
    name: Arc<str>,
    tx: mpsc::Sender<Message>,
    rx: mpsc::Receiver<Message>,
    profile: LinkProfile,
}

impl Commport {
    pub fn new(name: impl Into<String>, capacity: usize, profile: LinkProfile) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self { name: name.into().into(), tx, rx, profile }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The cloneable address of this mailbox.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint { name: Arc::clone(&self.name), tx: self.tx.clone(), profile: self.profile }
    }

    /// Receive the next message. With a timeout, fails with
    /// `NetworkTimeout` when it elapses first.
    pub async fn get(&mut self, timeout: Option<f64>) -> SimResult<Message> {
        match timeout {
            None => self.recv().await,
            Some(secs) => {
                let duration = Duration::from_secs_f64(secs.max(0.0));
                match tokio::time::timeout(duration, self.recv()).await {
                    Ok(result) => result,
                    Err(_) => Err(FailureCause::NetworkTimeout { endpoint: self.name.to_string() }),
                }
            }
        }
    }

    /// Receive whichever of two mailboxes delivers first.
    pub async fn get_race(
        &mut self,
        other: &mut Commport,
        timeout: Option<f64>,
    ) -> SimResult<Message> {
        let self_name = Arc::clone(&self.name);
        let other_name = Arc::clone(&other.name);
        let race = async {
            let left = std::pin::pin!(self.rx.recv());
            let right = std::pin::pin!(other.rx.recv());
            match select(left, right).await {
                Either::Left((msg, _)) => (msg, self_name),
                Either::Right((msg, _)) => (msg, other_name),
            }
        };
        let resolve = |(msg, name): (Option<Message>, Arc<str>)| {
            msg.ok_or(FailureCause::NetworkError { endpoint: name.to_string() })
        };
        match timeout {
            None => resolve(race.await),
            Some(secs) => {
                let duration = Duration::from_secs_f64(secs.max(0.0));
                match tokio::time::timeout(duration, race).await {
                    Ok(got) => resolve(got),
                    Err(_) => {
                        Err(FailureCause::NetworkTimeout { endpoint: self.name.to_string() })
                    }
                }
            }
        }
    }

    async fn recv(&mut self) -> SimResult<Message> {
        self.rx
            .recv()
            .await
            .ok_or(FailureCause::NetworkError { endpoint: self.name.to_string() })
    }
}

impl std::fmt::Debug for Commport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Commport({})", self.name)
    }
}

#[cfg(test)]
#[path = "commport_tests.rs"]
mod tests;
