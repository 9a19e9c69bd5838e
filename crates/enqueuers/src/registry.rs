// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-function enqueuer bookkeeping.

use crate::change_stream::{ChangeStreamSource, MemoryResumeTokenStore, ResumeTokenStore};
use crate::context::EnqueuerContext;
use crate::enqueuer::Enqueuer;
use crate::error::EnqueuerError;
use crate::http::HttpRoutes;
use crate::message_queue::MessageBroker;
use crate::pub_sub::PubSubSource;
use hz_core::{FunctionDef, FunctionId, TriggerKind};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// External systems the source-driven enqueuers attach to.
///
/// HTTP and schedule triggers need none. A trigger whose source is missing
/// fails registration with [`EnqueuerError::SourceUnavailable`].
#[derive(Clone)]
pub struct TriggerSources {
    pub change_stream: Option<Arc<dyn ChangeStreamSource>>,
    pub resume_tokens: Arc<dyn ResumeTokenStore>,
    pub message_broker: Option<Arc<dyn MessageBroker>>,
    pub pub_sub: Option<Arc<dyn PubSubSource>>,
}

impl Default for TriggerSources {
    fn default() -> Self {
        Self {
            change_stream: None,
            resume_tokens: Arc::new(MemoryResumeTokenStore::new()),
            message_broker: None,
            pub_sub: None,
        }
    }
}

impl TriggerSources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_change_stream(mut self, source: impl ChangeStreamSource) -> Self {
        self.change_stream = Some(Arc::new(source));
        self
    }

    pub fn with_resume_tokens(mut self, store: impl ResumeTokenStore) -> Self {
        self.resume_tokens = Arc::new(store);
        self
    }

    pub fn with_message_broker(mut self, broker: impl MessageBroker) -> Self {
        self.message_broker = Some(Arc::new(broker));
        self
    }

    pub fn with_pub_sub(mut self, source: impl PubSubSource) -> Self {
        self.pub_sub = Some(Arc::new(source));
        self
    }

    /// Kinds registration will accept with these sources
    pub fn available(&self) -> Vec<TriggerKind> {
        TriggerKind::ALL
            .into_iter()
            .filter(|kind| match kind {
                TriggerKind::Http | TriggerKind::Schedule => true,
                TriggerKind::ChangeStream => self.change_stream.is_some(),
                TriggerKind::MessageQueue => self.message_broker.is_some(),
                TriggerKind::PubSub => self.pub_sub.is_some(),
            })
            .collect()
    }
}

struct Registration {
    function: Arc<FunctionDef>,
    enqueuers: Vec<Enqueuer>,
}

/// Running enqueuers, keyed by function.
pub struct TriggerRegistry {
    ctx: EnqueuerContext,
    sources: TriggerSources,
    functions: Mutex<HashMap<FunctionId, Arc<Registration>>>,
}

impl TriggerRegistry {
    pub fn new(ctx: EnqueuerContext, sources: TriggerSources) -> Self {
        Self {
            ctx,
            sources,
            functions: Mutex::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &EnqueuerContext {
        &self.ctx
    }

    /// Build and start one enqueuer per trigger.
    ///
    /// All triggers are validated before anything starts; one invalid
    /// trigger leaves the registry unchanged. Re-registering a function
    /// replaces (and stops) its previous enqueuers.
    pub async fn register_function(&self, function: FunctionDef) -> Result<usize, EnqueuerError> {
        let function = Arc::new(function);
        let enqueuers = function
            .triggers
            .iter()
            .map(|trigger| Enqueuer::register(Arc::clone(&function), trigger, &self.ctx, &self.sources))
            .collect::<Result<Vec<_>, _>>()?;

        for enqueuer in &enqueuers {
            enqueuer.start();
        }
        let count = enqueuers.len();
        tracing::info!(function_id = %function.id, triggers = count, "function registered");

        let previous = self.functions.lock().insert(
            function.id.clone(),
            Arc::new(Registration {
                function,
                enqueuers,
            }),
        );
        if let Some(previous) = previous {
            stop_all(&previous).await;
        }
        Ok(count)
    }

    /// Stop and drop a function's enqueuers. False if it was not registered.
    pub async fn unregister_function(&self, function_id: &FunctionId) -> bool {
        let removed = self.functions.lock().remove(function_id);
        match removed {
            Some(registration) => {
                stop_all(&registration).await;
                tracing::info!(%function_id, "function unregistered");
                true
            }
            None => false,
        }
    }

    /// The HTTP triggers of a function, for the API layer
    pub fn http(&self, function_id: &FunctionId) -> Option<HttpRoutes> {
        let functions = self.functions.lock();
        let registration = functions.get(function_id)?;
        let routes: Vec<_> = registration
            .enqueuers
            .iter()
            .filter_map(Enqueuer::as_http)
            .cloned()
            .collect();
        if routes.is_empty() {
            return None;
        }
        Some(HttpRoutes::new(function_id.clone(), routes))
    }

    pub fn functions(&self) -> Vec<FunctionId> {
        let mut ids: Vec<_> = self.functions.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn function(&self, function_id: &FunctionId) -> Option<Arc<FunctionDef>> {
        self.functions
            .lock()
            .get(function_id)
            .map(|r| Arc::clone(&r.function))
    }

    /// (kind, running) for each trigger of a function
    pub fn triggers(&self, function_id: &FunctionId) -> Vec<(TriggerKind, bool)> {
        self.functions
            .lock()
            .get(function_id)
            .map(|r| r.enqueuers.iter().map(|e| (e.kind(), e.is_running())).collect())
            .unwrap_or_default()
    }

    /// Stop every enqueuer and forget all functions.
    pub async fn shutdown(&self) {
        let registrations: Vec<_> = self.functions.lock().drain().map(|(_, r)| r).collect();
        for registration in &registrations {
            stop_all(registration).await;
        }
        tracing::info!(functions = registrations.len(), "trigger registry shut down");
    }
}

async fn stop_all(registration: &Registration) {
    for enqueuer in &registration.enqueuers {
        enqueuer.stop().await;
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
