// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pub/sub triggers: every pushed message is its own event.

use crate::context::EnqueuerContext;
use crate::error::{EnqueuerError, SourceError};
use crate::lifecycle::{sleep_or_stop, stopped, Backoff, StopSignal, TaskSlot};
use crate::options::{invalid, parse_options};
use async_trait::async_trait;
use hz_core::{FunctionDef, TriggerConfig, TriggerId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PubSubOptions {
    pub topic: String,
    /// Durable subscription name; an ephemeral one when absent
    #[serde(default)]
    pub subscription: Option<String>,
}

impl PubSubOptions {
    fn validate(self, trigger: &TriggerConfig) -> Result<Self, EnqueuerError> {
        if self.topic.trim().is_empty() {
            return Err(invalid(trigger, "topic must not be empty"));
        }
        if self.subscription.as_ref().is_some_and(|s| s.trim().is_empty()) {
            return Err(invalid(trigger, "subscription must not be empty"));
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PubSubMessage {
    pub id: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl PubSubMessage {
    pub fn new(id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            data,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

/// Live subscription; the source closes the channel on disconnect
pub type Subscription = mpsc::Receiver<PubSubMessage>;

#[async_trait]
pub trait PubSubSource: Send + Sync + 'static {
    async fn subscribe(&self, topic: &str, subscription: Option<&str>) -> Result<Subscription, SourceError>;
    async fn ack(&self, topic: &str, message_id: &str) -> Result<(), SourceError>;
}

struct PubSubInner {
    function: Arc<FunctionDef>,
    trigger: TriggerConfig,
    options: PubSubOptions,
    ctx: EnqueuerContext,
    source: Arc<dyn PubSubSource>,
}

impl PubSubInner {
    async fn run(self: Arc<Self>, mut signal: StopSignal) {
        let topic = self.options.topic.as_str();
        let subscription = self.options.subscription.as_deref();
        let mut backoff = Backoff::default();
        loop {
            let subscribed = tokio::select! {
                subscribed = self.source.subscribe(topic, subscription) => subscribed,
                _ = stopped(&mut signal) => return,
            };
            let mut messages = match subscribed {
                Ok(messages) => messages,
                Err(e) => {
                    tracing::warn!(topic, error = %e, "subscribe failed");
                    if sleep_or_stop(backoff.next_delay(), &mut signal).await {
                        return;
                    }
                    continue;
                }
            };
            tracing::info!(topic, subscription, "subscribed");

            let mut delivered = false;
            loop {
                tokio::select! {
                    _ = stopped(&mut signal) => return,
                    message = messages.recv() => match message {
                        Some(message) => {
                            if !delivered {
                                backoff.reset();
                                delivered = true;
                            }
                            self.handle(message).await;
                        }
                        None => break,
                    },
                }
            }

            tracing::warn!(topic, "subscription closed");
            if sleep_or_stop(backoff.next_delay(), &mut signal).await {
                return;
            }
        }
    }

    async fn handle(&self, message: PubSubMessage) {
        let payload = serde_json::json!({
            "topic": self.options.topic,
            "message_id": message.id,
            "data": message.data,
            "attributes": message.attributes,
        });
        // Acked whether or not the event was queued; failures are reported
        self.ctx.emit(&self.function, &self.trigger, payload);
        if let Err(e) = self.source.ack(&self.options.topic, &message.id).await {
            tracing::warn!(topic = %self.options.topic, message_id = %message.id, error = %e, "pub/sub ack failed");
        }
    }
}

/// Enqueuer for one pub/sub trigger
pub struct PubSubEnqueuer {
    inner: Arc<PubSubInner>,
    task: TaskSlot,
}

impl PubSubEnqueuer {
    pub fn register(
        function: Arc<FunctionDef>,
        trigger: &TriggerConfig,
        ctx: &EnqueuerContext,
        source: Arc<dyn PubSubSource>,
    ) -> Result<Self, EnqueuerError> {
        let options = parse_options::<PubSubOptions>(trigger)?.validate(trigger)?;
        Ok(Self {
            inner: Arc::new(PubSubInner {
                function,
                trigger: trigger.clone(),
                options,
                ctx: ctx.clone(),
                source,
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

    pub fn options(&self) -> &PubSubOptions {
        &self.inner.options
    }
}

#[cfg(test)]
#[path = "pub_sub_tests.rs"]
mod tests;
