// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message-queue triggers.
//!
//! A broker delivery is acked once its event has been taken by a worker
//! (state past Pending). If the enqueuer stops first, or the queue refuses
//! the event, the delivery is nacked with requeue so the broker redelivers
//! it. Deliveries that cannot become events at all are acked and reported,
//! so a poison message does not loop.

use crate::context::EnqueuerContext;
use crate::error::{EnqueuerError, SourceError};
use crate::lifecycle::{sleep_or_stop, stopped, Backoff, StopSignal, TaskSlot};
use crate::options::{invalid, parse_options};
use async_trait::async_trait;
use hz_core::{EventState, FunctionDef, TriggerConfig, TriggerId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

/// Unacked deliveries the broker may push when `prefetch` is absent
pub const DEFAULT_PREFETCH: u16 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageQueueOptions {
    pub queue: String,
    #[serde(default)]
    pub prefetch: Option<u16>,
}

impl MessageQueueOptions {
    fn validate(self, trigger: &TriggerConfig) -> Result<Self, EnqueuerError> {
        if self.queue.trim().is_empty() {
            return Err(invalid(trigger, "queue must not be empty"));
        }
        if self.prefetch == Some(0) {
            return Err(invalid(trigger, "prefetch must be at least 1"));
        }
        Ok(self)
    }

    pub fn prefetch(&self) -> u16 {
        self.prefetch.unwrap_or(DEFAULT_PREFETCH)
    }
}

/// One message handed out by the broker, identified by its delivery tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub tag: u64,
    pub body: Vec<u8>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub redelivered: bool,
}

impl Delivery {
    pub fn new(tag: u64, body: impl Into<Vec<u8>>) -> Self {
        Self {
            tag,
            body: body.into(),
            headers: BTreeMap::new(),
            redelivered: false,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn redelivered(mut self) -> Self {
        self.redelivered = true;
        self
    }

    /// JSON bodies are embedded as-is, other UTF-8 bodies as a string.
    fn body_value(&self) -> Result<serde_json::Value, EnqueuerError> {
        if let Ok(value) = serde_json::from_slice(&self.body) {
            return Ok(value);
        }
        match std::str::from_utf8(&self.body) {
            Ok(text) => Ok(serde_json::Value::String(text.to_string())),
            Err(_) => Err(EnqueuerError::Malformed(format!(
                "delivery {} body is not UTF-8",
                self.tag
            ))),
        }
    }
}

/// Open consumer; the broker closes the channel on disconnect
pub type Deliveries = mpsc::Receiver<Delivery>;

/// Broker side of a message-queue trigger
#[async_trait]
pub trait MessageBroker: Send + Sync + 'static {
    async fn consume(&self, queue: &str, prefetch: u16) -> Result<Deliveries, SourceError>;
    async fn ack(&self, queue: &str, tag: u64) -> Result<(), SourceError>;
    async fn nack(&self, queue: &str, tag: u64, requeue: bool) -> Result<(), SourceError>;
}

struct MessageQueueInner {
    function: Arc<FunctionDef>,
    trigger: TriggerConfig,
    options: MessageQueueOptions,
    ctx: EnqueuerContext,
    broker: Arc<dyn MessageBroker>,
}

impl MessageQueueInner {
    async fn run(self: Arc<Self>, mut signal: StopSignal) {
        let queue = self.options.queue.as_str();
        let mut backoff = Backoff::default();
        let mut watchers = JoinSet::new();

        'consume: loop {
            let consumed = tokio::select! {
                consumed = self.broker.consume(queue, self.options.prefetch()) => consumed,
                _ = stopped(&mut signal) => break 'consume,
            };
            let mut deliveries = match consumed {
                Ok(deliveries) => deliveries,
                Err(e) => {
                    tracing::warn!(queue, error = %e, "broker consume failed");
                    if sleep_or_stop(backoff.next_delay(), &mut signal).await {
                        break 'consume;
                    }
                    continue;
                }
            };
            tracing::info!(queue, prefetch = self.options.prefetch(), "consuming");

            let mut delivered = false;
            loop {
                tokio::select! {
                    _ = stopped(&mut signal) => break 'consume,
                    Some(joined) = watchers.join_next(), if !watchers.is_empty() => {
                        if let Err(e) = joined {
                            tracing::error!(queue, error = %e, "delivery watcher failed");
                        }
                    }
                    delivery = deliveries.recv() => match delivery {
                        Some(delivery) => {
                            if !delivered {
                                backoff.reset();
                                delivered = true;
                            }
                            self.dispatch(delivery, &mut watchers, &signal).await;
                        }
                        None => break,
                    },
                }
            }

            tracing::warn!(queue, "broker consumer disconnected");
            if sleep_or_stop(backoff.next_delay(), &mut signal).await {
                break 'consume;
            }
        }

        // Watchers share the stop signal; each settles its delivery.
        while watchers.join_next().await.is_some() {}
    }

    async fn dispatch(self: &Arc<Self>, delivery: Delivery, watchers: &mut JoinSet<()>, signal: &StopSignal) {
        let tag = delivery.tag;
        let submitted = delivery
            .body_value()
            .map(|body| self.payload(&delivery, body))
            .and_then(|payload| self.ctx.submit(&self.function, &self.trigger, payload));

        match submitted {
            Ok(event_id) => match self.ctx.queue().watch(&event_id) {
                Some(state) => {
                    let inner = Arc::clone(self);
                    watchers.spawn(inner.settle(tag, state, signal.clone()));
                }
                // Already retired: it was assigned at some point
                None => self.ack(tag).await,
            },
            Err(error @ EnqueuerError::Queue(_)) => {
                self.ctx.report(&self.function, &self.trigger, error);
                self.nack(tag).await;
            }
            Err(error) => {
                self.ctx.report(&self.function, &self.trigger, error);
                self.ack(tag).await;
            }
        }
    }

    fn payload(&self, delivery: &Delivery, body: serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "queue": self.options.queue,
            "body": body,
            "headers": delivery.headers,
            "redelivered": delivery.redelivered,
        })
    }

    /// Ack once the event leaves Pending; nack if stopped before that.
    async fn settle(self: Arc<Self>, tag: u64, mut state: watch::Receiver<EventState>, mut signal: StopSignal) {
        let stopped_first = tokio::select! {
            _ = async { state.wait_for(|s| *s != EventState::Pending).await.is_ok() } => false,
            _ = stopped(&mut signal) => true,
        };
        let taken = !stopped_first || *state.borrow() != EventState::Pending;
        if taken {
            self.ack(tag).await;
        } else {
            tracing::debug!(queue = %self.options.queue, tag, "stopped before assignment, requeueing delivery");
            self.nack(tag).await;
        }
    }

    async fn ack(&self, tag: u64) {
        if let Err(e) = self.broker.ack(&self.options.queue, tag).await {
            tracing::warn!(queue = %self.options.queue, tag, error = %e, "broker ack failed");
        }
    }

    async fn nack(&self, tag: u64) {
        if let Err(e) = self.broker.nack(&self.options.queue, tag, true).await {
            tracing::warn!(queue = %self.options.queue, tag, error = %e, "broker nack failed");
        }
    }
}

/// Enqueuer for one message-queue trigger
pub struct MessageQueueEnqueuer {
    inner: Arc<MessageQueueInner>,
    task: TaskSlot,
}

impl MessageQueueEnqueuer {
    pub fn register(
        function: Arc<FunctionDef>,
        trigger: &TriggerConfig,
        ctx: &EnqueuerContext,
        broker: Arc<dyn MessageBroker>,
    ) -> Result<Self, EnqueuerError> {
        let options = parse_options::<MessageQueueOptions>(trigger)?.validate(trigger)?;
        Ok(Self {
            inner: Arc::new(MessageQueueInner {
                function,
                trigger: trigger.clone(),
                options,
                ctx: ctx.clone(),
                broker,
            }),
            task: TaskSlot::default(),
        })
    }

    pub fn start(&self) {
        let inner = Arc::clone(&self.inner);
        self.task.start(move |signal| inner.run(signal));
    }

    pub async fn stop(&self) {
        self.task.stop().await;
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    pub fn trigger_id(&self) -> &TriggerId {
        &self.inner.trigger.id
    }

    pub fn options(&self) -> &MessageQueueOptions {
        &self.inner.options
    }
}

#[cfg(test)]
#[path = "message_queue_tests.rs"]
mod tests;
