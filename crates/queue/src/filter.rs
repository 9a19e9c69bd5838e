// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pop filters (scheduler specialization by trigger kind or function).

use hz_core::{Event, FunctionId, TriggerKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Selects which Pending events a `pop` may return.
///
/// An empty filter matches everything. FIFO order holds within one filter
/// class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggers: Option<BTreeSet<TriggerKind>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub functions: Option<BTreeSet<FunctionId>>,
}

impl EventFilter {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn triggers(kinds: impl IntoIterator<Item = TriggerKind>) -> Self {
        Self {
            triggers: Some(kinds.into_iter().collect()),
            functions: None,
        }
    }

    pub fn functions<I, F>(ids: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<FunctionId>,
    {
        Self {
            triggers: None,
            functions: Some(ids.into_iter().map(Into::into).collect()),
        }
    }

    pub fn matches(&self, event: &Event) -> bool {
        if let Some(kinds) = &self.triggers {
            if !kinds.contains(&event.target.trigger) {
                return false;
            }
        }
        if let Some(functions) = &self.functions {
            if !functions.contains(&event.target.function_id) {
                return false;
            }
        }
        true
    }

    pub fn is_any(&self) -> bool {
        self.triggers.is_none() && self.functions.is_none()
    }
}
