// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Database change-stream triggers.
//!
//! One watch per bucket. After every change the stream's resume token is
//! saved, so a reconnect picks up after the last change seen rather than
//! replaying or skipping.

use crate::context::EnqueuerContext;
use crate::error::{EnqueuerError, SourceError};
use crate::lifecycle::{sleep_or_stop, stopped, Backoff, StopSignal, TaskSlot};
use crate::options::{invalid, parse_options};
use async_trait::async_trait;
use hz_core::{FunctionDef, TriggerConfig, TriggerId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOperation {
    Insert,
    Update,
    Replace,
    Delete,
}

impl ChangeOperation {
    pub const ALL: [ChangeOperation; 4] = [
        ChangeOperation::Insert,
        ChangeOperation::Update,
        ChangeOperation::Replace,
        ChangeOperation::Delete,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangeStreamOptions {
    pub bucket: String,
    /// Operations that produce events; all of them when absent
    #[serde(default)]
    pub operations: Option<Vec<ChangeOperation>>,
    /// Include the post-change document for updates and deletes too
    #[serde(default)]
    pub full_document: bool,
}

impl ChangeStreamOptions {
    fn validate(self, trigger: &TriggerConfig) -> Result<Self, EnqueuerError> {
        if self.bucket.trim().is_empty() {
            return Err(invalid(trigger, "bucket must not be empty"));
        }
        if self.operations.as_ref().is_some_and(Vec::is_empty) {
            return Err(invalid(trigger, "operations must not be empty"));
        }
        Ok(self)
    }

    pub fn selects(&self, operation: ChangeOperation) -> bool {
        self.operations
            .as_ref()
            .map_or(true, |ops| ops.contains(&operation))
    }
}

/// One change delivered by the source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub operation: ChangeOperation,
    pub bucket: String,
    pub document_id: String,
    #[serde(default)]
    pub document: Option<serde_json::Value>,
    /// Opaque position to resume after this change
    pub resume_token: String,
}

/// Live watch; the source closes the channel on disconnect
pub type ChangeStream = mpsc::Receiver<ChangeEvent>;

/// Database side of a change stream
#[async_trait]
pub trait ChangeStreamSource: Send + Sync + 'static {
    /// Open a watch on `bucket`, resuming after `resume_after` if given.
    async fn watch(&self, bucket: &str, resume_after: Option<String>) -> Result<ChangeStream, SourceError>;
}

/// Durable home for resume tokens
#[async_trait]
pub trait ResumeTokenStore: Send + Sync + 'static {
    async fn load(&self, key: &str) -> Result<Option<String>, SourceError>;
    async fn save(&self, key: &str, token: &str) -> Result<(), SourceError>;
}

/// Process-local token store; tokens are lost on restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryResumeTokenStore {
    tokens: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryResumeTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.tokens.lock().get(key).cloned()
    }
}

#[async_trait]
impl ResumeTokenStore for MemoryResumeTokenStore {
    async fn load(&self, key: &str) -> Result<Option<String>, SourceError> {
        Ok(self.get(key))
    }

    async fn save(&self, key: &str, token: &str) -> Result<(), SourceError> {
        self.tokens.lock().insert(key.to_string(), token.to_string());
        Ok(())
    }
}

/// Key a trigger's resume token is stored under
pub fn resume_key(function: &FunctionDef, trigger: &TriggerConfig) -> String {
    format!("{}/{}", function.id, trigger.id)
}

struct ChangeStreamInner {
    function: Arc<FunctionDef>,
    trigger: TriggerConfig,
    options: ChangeStreamOptions,
    ctx: EnqueuerContext,
    source: Arc<dyn ChangeStreamSource>,
    tokens: Arc<dyn ResumeTokenStore>,
    key: String,
}

impl ChangeStreamInner {
    async fn run(self: Arc<Self>, mut signal: StopSignal) {
        let bucket = self.options.bucket.as_str();
        let mut backoff = Backoff::default();
        loop {
            let resume_after = match self.tokens.load(&self.key).await {
                Ok(token) => token,
                Err(e) => {
                    tracing::warn!(bucket, error = %e, "failed to load resume token");
                    None
                }
            };
            let watch = tokio::select! {
                watch = self.source.watch(bucket, resume_after.clone()) => watch,
                _ = stopped(&mut signal) => return,
            };
            let mut stream = match watch {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!(bucket, error = %e, "change stream watch failed");
                    if sleep_or_stop(backoff.next_delay(), &mut signal).await {
                        return;
                    }
                    continue;
                }
            };
            tracing::info!(bucket, resume_after = ?resume_after, "watching change stream");

            let mut delivered = false;
            loop {
                tokio::select! {
                    _ = stopped(&mut signal) => return,
                    change = stream.recv() => match change {
                        Some(change) => {
                            // Only a stream that actually delivers earns a fresh backoff
                            if !delivered {
                                backoff.reset();
                                delivered = true;
                            }
                            self.handle(change).await;
                        }
                        None => break,
                    },
                }
            }

            tracing::warn!(bucket, "change stream disconnected");
            if sleep_or_stop(backoff.next_delay(), &mut signal).await {
                return;
            }
        }
    }

    async fn handle(&self, change: ChangeEvent) {
        if change.bucket != self.options.bucket {
            tracing::debug!(bucket = %change.bucket, "change for another bucket ignored");
        } else if self.options.selects(change.operation) {
            let payload = self.payload(&change);
            self.ctx.emit(&self.function, &self.trigger, payload);
        }

        if let Err(e) = self.tokens.save(&self.key, &change.resume_token).await {
            tracing::warn!(key = %self.key, error = %e, "failed to save resume token");
        }
    }

    fn payload(&self, change: &ChangeEvent) -> serde_json::Value {
        let include_document = self.options.full_document
            || matches!(change.operation, ChangeOperation::Insert | ChangeOperation::Replace);
        let mut payload = serde_json::json!({
            "operation": change.operation,
            "bucket": change.bucket,
            "document_id": change.document_id,
        });
        if include_document {
            if let Some(document) = &change.document {
                payload["document"] = document.clone();
            }
        }
        payload
    }
}

/// Enqueuer for one change-stream trigger
pub struct ChangeStreamEnqueuer {
    inner: Arc<ChangeStreamInner>,
    task: TaskSlot,
}

impl ChangeStreamEnqueuer {
    pub fn register(
        function: Arc<FunctionDef>,
        trigger: &TriggerConfig,
        ctx: &EnqueuerContext,
        source: Arc<dyn ChangeStreamSource>,
        tokens: Arc<dyn ResumeTokenStore>,
    ) -> Result<Self, EnqueuerError> {
        let options = parse_options::<ChangeStreamOptions>(trigger)?.validate(trigger)?;
        let key = resume_key(&function, trigger);
        Ok(Self {
            inner: Arc::new(ChangeStreamInner {
                function,
                trigger: trigger.clone(),
                options,
                ctx: ctx.clone(),
                source,
                tokens,
                key,
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

    pub fn options(&self) -> &ChangeStreamOptions {
        &self.inner.options
    }
}

#[cfg(test)]
#[path = "change_stream_tests.rs"]
mod tests;
