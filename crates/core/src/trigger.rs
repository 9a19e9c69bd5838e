// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Trigger kinds and per-function trigger configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

crate::define_id! {
    /// Identifier of one trigger configuration within a function definition.
    pub struct TriggerId;
}

/// The closed set of trigger kinds an enqueuer can be built for.
///
/// The string name is the only key: it is what function definitions carry
/// and what `FromStr`/serde accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Http,
    ChangeStream,
    Schedule,
    MessageQueue,
    PubSub,
}

impl TriggerKind {
    pub const ALL: [TriggerKind; 5] = [
        TriggerKind::Http,
        TriggerKind::ChangeStream,
        TriggerKind::Schedule,
        TriggerKind::MessageQueue,
        TriggerKind::PubSub,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Http => "http",
            TriggerKind::ChangeStream => "change_stream",
            TriggerKind::Schedule => "schedule",
            TriggerKind::MessageQueue => "message_queue",
            TriggerKind::PubSub => "pub_sub",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown trigger kind: {0}")]
pub struct UnknownTriggerKind(pub String);

impl FromStr for TriggerKind {
    type Err = UnknownTriggerKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(TriggerKind::Http),
            "change_stream" | "bucket" => Ok(TriggerKind::ChangeStream),
            "schedule" | "cron" => Ok(TriggerKind::Schedule),
            "message_queue" | "queue" => Ok(TriggerKind::MessageQueue),
            "pub_sub" | "pubsub" => Ok(TriggerKind::PubSub),
            other => Err(UnknownTriggerKind(other.to_string())),
        }
    }
}

/// One trigger attached to a function definition.
///
/// `options` are validated by the matching enqueuer at registration time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerConfig {
    pub id: TriggerId,
    pub kind: TriggerKind,
    #[serde(default = "empty_options")]
    pub options: serde_json::Value,
}

fn empty_options() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl TriggerConfig {
    pub fn new(id: impl Into<TriggerId>, kind: TriggerKind, options: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            kind,
            options,
        }
    }
}

#[cfg(test)]
#[path = "trigger_tests.rs"]
mod tests;
