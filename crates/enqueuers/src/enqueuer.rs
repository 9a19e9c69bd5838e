// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The closed set of enqueuers, one variant per trigger kind.

use crate::change_stream::ChangeStreamEnqueuer;
use crate::context::EnqueuerContext;
use crate::error::EnqueuerError;
use crate::http::HttpEnqueuer;
use crate::message_queue::MessageQueueEnqueuer;
use crate::pub_sub::PubSubEnqueuer;
use crate::registry::TriggerSources;
use crate::schedule::ScheduleEnqueuer;
use hz_core::{FunctionDef, TriggerConfig, TriggerId, TriggerKind};
use std::sync::Arc;

pub enum Enqueuer {
    Http(HttpEnqueuer),
    ChangeStream(ChangeStreamEnqueuer),
    Schedule(ScheduleEnqueuer),
    MessageQueue(MessageQueueEnqueuer),
    PubSub(PubSubEnqueuer),
}

impl Enqueuer {
    /// Validate `trigger` and build the matching enqueuer, not yet started.
    pub fn register(
        function: Arc<FunctionDef>,
        trigger: &TriggerConfig,
        ctx: &EnqueuerContext,
        sources: &TriggerSources,
    ) -> Result<Self, EnqueuerError> {
        let unavailable = || EnqueuerError::SourceUnavailable(trigger.kind);
        let enqueuer = match trigger.kind {
            TriggerKind::Http => Enqueuer::Http(HttpEnqueuer::register(function, trigger, ctx)?),
            TriggerKind::Schedule => Enqueuer::Schedule(ScheduleEnqueuer::register(function, trigger, ctx)?),
            TriggerKind::ChangeStream => {
                let source = sources.change_stream.clone().ok_or_else(unavailable)?;
                Enqueuer::ChangeStream(ChangeStreamEnqueuer::register(
                    function,
                    trigger,
                    ctx,
                    source,
                    Arc::clone(&sources.resume_tokens),
                )?)
            }
            TriggerKind::MessageQueue => {
                let broker = sources.message_broker.clone().ok_or_else(unavailable)?;
                Enqueuer::MessageQueue(MessageQueueEnqueuer::register(function, trigger, ctx, broker)?)
            }
            TriggerKind::PubSub => {
                let source = sources.pub_sub.clone().ok_or_else(unavailable)?;
                Enqueuer::PubSub(PubSubEnqueuer::register(function, trigger, ctx, source)?)
            }
        };
        Ok(enqueuer)
    }

    pub fn kind(&self) -> TriggerKind {
        match self {
            Enqueuer::Http(_) => TriggerKind::Http,
            Enqueuer::ChangeStream(_) => TriggerKind::ChangeStream,
            Enqueuer::Schedule(_) => TriggerKind::Schedule,
            Enqueuer::MessageQueue(_) => TriggerKind::MessageQueue,
            Enqueuer::PubSub(_) => TriggerKind::PubSub,
        }
    }

    pub fn trigger_id(&self) -> &TriggerId {
        match self {
            Enqueuer::Http(e) => e.trigger_id(),
            Enqueuer::ChangeStream(e) => e.trigger_id(),
            Enqueuer::Schedule(e) => e.trigger_id(),
            Enqueuer::MessageQueue(e) => e.trigger_id(),
            Enqueuer::PubSub(e) => e.trigger_id(),
        }
    }

    /// Begin listening. Idempotent.
    pub fn start(&self) {
        match self {
            Enqueuer::Http(e) => e.start(),
            Enqueuer::ChangeStream(e) => e.start(),
            Enqueuer::Schedule(e) => e.start(),
            Enqueuer::MessageQueue(e) => e.start(),
            Enqueuer::PubSub(e) => e.start(),
        }
    }

    /// Release external subscriptions. Safe to call repeatedly.
    pub async fn stop(&self) {
        match self {
            Enqueuer::Http(e) => e.stop(),
            Enqueuer::ChangeStream(e) => e.stop().await,
            Enqueuer::Schedule(e) => e.stop().await,
            Enqueuer::MessageQueue(e) => e.stop().await,
            Enqueuer::PubSub(e) => e.stop().await,
        }
    }

    pub fn is_running(&self) -> bool {
        match self {
            Enqueuer::Http(e) => e.is_running(),
            Enqueuer::ChangeStream(e) => e.is_running(),
            Enqueuer::Schedule(e) => e.is_running(),
            Enqueuer::MessageQueue(e) => e.is_running(),
            Enqueuer::PubSub(e) => e.is_running(),
        }
    }

    pub fn as_http(&self) -> Option<&HttpEnqueuer> {
        match self {
            Enqueuer::Http(e) => Some(e),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Enqueuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enqueuer")
            .field("kind", &self.kind())
            .field("trigger_id", self.trigger_id())
            .finish()
    }
}
