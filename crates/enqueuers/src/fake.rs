// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scriptable trigger sources for tests.
#![cfg_attr(coverage_nightly, coverage(off))]

use crate::change_stream::{ChangeEvent, ChangeStream, ChangeStreamSource};
use crate::error::SourceError;
use crate::message_queue::{Deliveries, Delivery, MessageBroker};
use crate::pub_sub::{PubSubMessage, PubSubSource, Subscription};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const CHANNEL_CAPACITY: usize = 64;

/// Poll `check` until it holds, yielding to other tasks in between.
async fn wait_until(mut check: impl FnMut() -> bool) {
    while !check() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ── Change stream ───────────────────────────────────────────────────────────

#[derive(Default)]
struct ChangeStreamState {
    current: Option<mpsc::Sender<ChangeEvent>>,
    watches: Vec<(String, Option<String>)>,
    fail_next: usize,
}

/// Change stream fed by the test. Only the latest watch receives changes.
#[derive(Clone, Default)]
pub struct FakeChangeStreamSource {
    state: Arc<Mutex<ChangeStreamState>>,
}

impl FakeChangeStreamSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` watch attempts.
    pub fn fail_next_watches(&self, n: usize) {
        self.state.lock().fail_next = n;
    }

    /// Deliver a change on the live watch. False if there is none.
    pub async fn push(&self, change: ChangeEvent) -> bool {
        let tx = self.state.lock().current.clone();
        match tx {
            Some(tx) => tx.send(change).await.is_ok(),
            None => false,
        }
    }

    /// Close the live watch as a dropped connection would.
    pub fn disconnect(&self) {
        self.state.lock().current = None;
    }

    /// (bucket, resume_after) of every successful watch, in order
    pub fn watches(&self) -> Vec<(String, Option<String>)> {
        self.state.lock().watches.clone()
    }

    pub async fn wait_for_watches(&self, n: usize) {
        wait_until(|| self.state.lock().watches.len() >= n).await;
    }
}

#[async_trait]
impl ChangeStreamSource for FakeChangeStreamSource {
    async fn watch(&self, bucket: &str, resume_after: Option<String>) -> Result<ChangeStream, SourceError> {
        let mut state = self.state.lock();
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(SourceError::new("change stream unavailable"));
        }
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        state.current = Some(tx);
        state.watches.push((bucket.to_string(), resume_after));
        Ok(rx)
    }
}

// ── Message broker ──────────────────────────────────────────────────────────

/// Acknowledgement the broker received for a delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerAck {
    Ack { queue: String, tag: u64 },
    Nack { queue: String, tag: u64, requeue: bool },
}

#[derive(Default)]
struct BrokerState {
    consumers: HashMap<String, mpsc::Sender<Delivery>>,
    consumes: Vec<(String, u16)>,
    acks: Vec<BrokerAck>,
    fail_next: usize,
}

/// In-memory broker: tests publish deliveries and inspect acks.
#[derive(Clone, Default)]
pub struct FakeMessageBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl FakeMessageBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_consumes(&self, n: usize) {
        self.state.lock().fail_next = n;
    }

    /// Hand a delivery to the queue's consumer. False if none is attached.
    pub async fn publish(&self, queue: &str, delivery: Delivery) -> bool {
        let tx = self.state.lock().consumers.get(queue).cloned();
        match tx {
            Some(tx) => tx.send(delivery).await.is_ok(),
            None => false,
        }
    }

    pub fn disconnect(&self, queue: &str) {
        self.state.lock().consumers.remove(queue);
    }

    /// (queue, prefetch) of every successful consume
    pub fn consumes(&self) -> Vec<(String, u16)> {
        self.state.lock().consumes.clone()
    }

    pub fn acks(&self) -> Vec<BrokerAck> {
        self.state.lock().acks.clone()
    }

    pub async fn wait_for_consumes(&self, n: usize) {
        wait_until(|| self.state.lock().consumes.len() >= n).await;
    }

    pub async fn wait_for_acks(&self, n: usize) {
        wait_until(|| self.state.lock().acks.len() >= n).await;
    }
}

#[async_trait]
impl MessageBroker for FakeMessageBroker {
    async fn consume(&self, queue: &str, prefetch: u16) -> Result<Deliveries, SourceError> {
        let mut state = self.state.lock();
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(SourceError::new("broker unavailable"));
        }
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        state.consumers.insert(queue.to_string(), tx);
        state.consumes.push((queue.to_string(), prefetch));
        Ok(rx)
    }

    async fn ack(&self, queue: &str, tag: u64) -> Result<(), SourceError> {
        self.state.lock().acks.push(BrokerAck::Ack {
            queue: queue.to_string(),
            tag,
        });
        Ok(())
    }

    async fn nack(&self, queue: &str, tag: u64, requeue: bool) -> Result<(), SourceError> {
        self.state.lock().acks.push(BrokerAck::Nack {
            queue: queue.to_string(),
            tag,
            requeue,
        });
        Ok(())
    }
}

// ── Pub/sub ─────────────────────────────────────────────────────────────────

#[derive(Default)]
struct PubSubState {
    subscribers: HashMap<String, mpsc::Sender<PubSubMessage>>,
    subscriptions: Vec<(String, Option<String>)>,
    acked: Vec<String>,
    fail_next: usize,
}

/// In-memory topic bus.
#[derive(Clone, Default)]
pub struct FakePubSubSource {
    state: Arc<Mutex<PubSubState>>,
}

impl FakePubSubSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_subscribes(&self, n: usize) {
        self.state.lock().fail_next = n;
    }

    pub async fn push(&self, topic: &str, message: PubSubMessage) -> bool {
        let tx = self.state.lock().subscribers.get(topic).cloned();
        match tx {
            Some(tx) => tx.send(message).await.is_ok(),
            None => false,
        }
    }

    pub fn disconnect(&self, topic: &str) {
        self.state.lock().subscribers.remove(topic);
    }

    /// (topic, subscription) of every successful subscribe
    pub fn subscriptions(&self) -> Vec<(String, Option<String>)> {
        self.state.lock().subscriptions.clone()
    }

    /// Message ids acked, in order
    pub fn acked(&self) -> Vec<String> {
        self.state.lock().acked.clone()
    }

    pub async fn wait_for_subscriptions(&self, n: usize) {
        wait_until(|| self.state.lock().subscriptions.len() >= n).await;
    }

    pub async fn wait_for_acks(&self, n: usize) {
        wait_until(|| self.state.lock().acked.len() >= n).await;
    }
}

#[async_trait]
impl PubSubSource for FakePubSubSource {
    async fn subscribe(&self, topic: &str, subscription: Option<&str>) -> Result<Subscription, SourceError> {
        let mut state = self.state.lock();
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(SourceError::new("pub/sub unavailable"));
        }
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        state.subscribers.insert(topic.to_string(), tx);
        state
            .subscriptions
            .push((topic.to_string(), subscription.map(str::to_string)));
        Ok(rx)
    }

    async fn ack(&self, _topic: &str, message_id: &str) -> Result<(), SourceError> {
        self.state.lock().acked.push(message_id.to_string());
        Ok(())
    }
}
