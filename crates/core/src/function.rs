// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Function definitions as supplied by the definition store.

use crate::trigger::{TriggerConfig, TriggerId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

crate::define_id! {
    /// Identifier of a user-authored function.
    pub struct FunctionId;
}

/// A deployed function: its compiled entrypoint, the environment injected
/// into every execution, and the triggers that produce events for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub id: FunctionId,
    #[serde(default)]
    pub name: String,
    /// Location of the runnable artifact produced by the compiler
    pub entrypoint: PathBuf,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Per-execution timeout; the scheduler default applies when absent
    #[serde(
        default,
        with = "crate::duration::human_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub triggers: Vec<TriggerConfig>,
}

impl FunctionDef {
    pub fn new(id: impl Into<FunctionId>, entrypoint: impl Into<PathBuf>) -> Self {
        let id = id.into();
        Self {
            name: id.to_string(),
            id,
            entrypoint: entrypoint.into(),
            env: BTreeMap::new(),
            timeout: None,
            triggers: Vec::new(),
        }
    }

    pub fn with_trigger(mut self, trigger: TriggerConfig) -> Self {
        self.triggers.push(trigger);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn trigger(&self, id: &TriggerId) -> Option<&TriggerConfig> {
        self.triggers.iter().find(|t| &t.id == id)
    }

    /// Display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            self.id.as_str()
        } else {
            &self.name
        }
    }
}
