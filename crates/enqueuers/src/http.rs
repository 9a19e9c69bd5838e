// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP-triggered invocations.
//!
//! The API layer hands each request to [`HttpEnqueuer::invoke`]; the
//! enqueuer admits it against `max_in_flight`, queues the event, and
//! returns an [`Invocation`] the caller can await for the terminal state.

use crate::context::EnqueuerContext;
use crate::error::EnqueuerError;
use crate::options::{invalid, parse_options};
use hz_core::{EventId, EventState, FunctionDef, FunctionId, TriggerConfig, TriggerId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};

const METHODS: [&str; 7] = ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpOptions {
    /// Only this method matches; any method when absent
    #[serde(default)]
    pub method: Option<String>,
    /// Only this path matches; any path when absent
    #[serde(default)]
    pub path: Option<String>,
    /// Admission limit on non-terminal invocations
    #[serde(default)]
    pub max_in_flight: Option<usize>,
}

impl HttpOptions {
    fn validate(mut self, trigger: &TriggerConfig) -> Result<Self, EnqueuerError> {
        if let Some(method) = &self.method {
            let upper = method.to_ascii_uppercase();
            if !METHODS.contains(&upper.as_str()) {
                return Err(invalid(trigger, format!("unsupported method {method:?}")));
            }
            self.method = Some(upper);
        }
        if let Some(path) = &self.path {
            if !path.starts_with('/') {
                return Err(invalid(trigger, format!("path {path:?} must start with '/'")));
            }
        }
        if self.max_in_flight == Some(0) {
            return Err(invalid(trigger, "max_in_flight must be at least 1"));
        }
        Ok(self)
    }

    pub fn matches(&self, method: &str, path: &str) -> bool {
        self.method
            .as_deref()
            .map_or(true, |m| m.eq_ignore_ascii_case(method))
            && self.path.as_deref().map_or(true, |p| p == path)
    }
}

/// Snapshot of an incoming request; becomes the event payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    #[serde(default)]
    pub body: serde_json::Value,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = body;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }
}

/// Handle on a queued HTTP invocation
#[derive(Debug)]
pub struct Invocation {
    event_id: EventId,
    state: watch::Receiver<EventState>,
}

impl Invocation {
    pub fn event_id(&self) -> &EventId {
        &self.event_id
    }

    pub fn state(&self) -> EventState {
        *self.state.borrow()
    }

    /// Wait for Completed, Failed or TimedOut.
    pub async fn wait(mut self) -> EventState {
        wait_terminal(&mut self.state).await
    }
}

async fn wait_terminal(rx: &mut watch::Receiver<EventState>) -> EventState {
    let waited = rx.wait_for(|s| s.is_terminal()).await.map(|state| *state);
    match waited {
        Ok(state) => state,
        // Sender gone with the retired event; the last value is terminal
        Err(_) => *rx.borrow(),
    }
}

struct HttpInner {
    function: Arc<FunctionDef>,
    trigger: TriggerConfig,
    options: HttpOptions,
    ctx: EnqueuerContext,
    admission: Option<Arc<Semaphore>>,
    running: AtomicBool,
}

/// Enqueuer for one HTTP trigger of one function. Cloning shares it.
#[derive(Clone)]
pub struct HttpEnqueuer {
    inner: Arc<HttpInner>,
}

impl HttpEnqueuer {
    pub fn register(
        function: Arc<FunctionDef>,
        trigger: &TriggerConfig,
        ctx: &EnqueuerContext,
    ) -> Result<Self, EnqueuerError> {
        let options = parse_options::<HttpOptions>(trigger)?.validate(trigger)?;
        let admission = options
            .max_in_flight
            .map(|limit| Arc::new(Semaphore::new(limit)));
        Ok(Self {
            inner: Arc::new(HttpInner {
                function,
                trigger: trigger.clone(),
                options,
                ctx: ctx.clone(),
                admission,
                running: AtomicBool::new(false),
            }),
        })
    }

    pub fn start(&self) {
        self.inner.running.store(true, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn trigger_id(&self) -> &TriggerId {
        &self.inner.trigger.id
    }

    pub fn options(&self) -> &HttpOptions {
        &self.inner.options
    }

    pub fn matches(&self, request: &HttpRequest) -> bool {
        self.inner.options.matches(&request.method, &request.path)
    }

    /// Queue one request.
    ///
    /// Rejections (no match, admission, payload size) are returned to the
    /// caller rather than reported on the error channel: the HTTP client is
    /// there to receive them. Must be called inside a tokio runtime.
    pub fn invoke(&self, request: HttpRequest) -> Result<Invocation, EnqueuerError> {
        let inner = &self.inner;
        if !self.is_running() {
            return Err(EnqueuerError::Stopped);
        }
        if !self.matches(&request) {
            return Err(EnqueuerError::NoMatchingTrigger {
                function_id: inner.function.id.clone(),
                method: request.method,
                path: request.path,
            });
        }

        let permit = match &inner.admission {
            Some(semaphore) => Some(self.admit(semaphore)?),
            None => None,
        };

        let payload = serde_json::to_value(&request).map_err(|e| EnqueuerError::Malformed(e.to_string()))?;
        let event_id = inner.ctx.submit(&inner.function, &inner.trigger, payload)?;
        let state = inner
            .ctx
            .queue()
            .watch(&event_id)
            .ok_or_else(|| EnqueuerError::Queue(hz_queue::QueueError::NotFound(event_id.clone())))?;

        if let Some(permit) = permit {
            let mut rx = state.clone();
            tokio::spawn(async move {
                wait_terminal(&mut rx).await;
                drop(permit);
            });
        }

        tracing::debug!(function_id = %inner.function.id, %event_id, "http invocation queued");
        Ok(Invocation { event_id, state })
    }

    fn admit(&self, semaphore: &Arc<Semaphore>) -> Result<OwnedSemaphorePermit, EnqueuerError> {
        Arc::clone(semaphore).try_acquire_owned().map_err(|_| {
            let limit = self.inner.options.max_in_flight.unwrap_or_default();
            tracing::warn!(function_id = %self.inner.function.id, limit, "http admission rejected");
            EnqueuerError::TooManyInFlight {
                function_id: self.inner.function.id.clone(),
                limit,
            }
        })
    }

    /// Invocations admitted and not yet terminal
    pub fn in_flight(&self) -> usize {
        match (&self.inner.admission, self.inner.options.max_in_flight) {
            (Some(semaphore), Some(limit)) => limit - semaphore.available_permits(),
            _ => 0,
        }
    }
}

/// All HTTP triggers of one function, routed by method and path.
#[derive(Clone)]
pub struct HttpRoutes {
    function_id: FunctionId,
    routes: Vec<HttpEnqueuer>,
}

impl HttpRoutes {
    pub(crate) fn new(function_id: FunctionId, routes: Vec<HttpEnqueuer>) -> Self {
        Self {
            function_id,
            routes,
        }
    }

    pub fn routes(&self) -> &[HttpEnqueuer] {
        &self.routes
    }

    /// Invoke the first trigger matching the request.
    pub fn invoke(&self, request: HttpRequest) -> Result<Invocation, EnqueuerError> {
        match self.routes.iter().find(|r| r.matches(&request)) {
            Some(route) => route.invoke(request),
            None => Err(EnqueuerError::NoMatchingTrigger {
                function_id: self.function_id.clone(),
                method: request.method,
                path: request.path,
            }),
        }
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
