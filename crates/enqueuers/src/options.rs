// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Trigger option decoding shared by all kinds.

use crate::error::EnqueuerError;
use hz_core::TriggerConfig;
use serde::de::DeserializeOwned;

/// Decode a trigger's options into the kind's schema.
///
/// A missing or null `options` decodes as an empty object, so kinds whose
/// fields are all optional accept it.
pub(crate) fn parse_options<T: DeserializeOwned>(trigger: &TriggerConfig) -> Result<T, EnqueuerError> {
    let options = match &trigger.options {
        serde_json::Value::Null => serde_json::Value::Object(serde_json::Map::new()),
        other => other.clone(),
    };
    serde_json::from_value(options).map_err(|e| invalid(trigger, e.to_string()))
}

pub(crate) fn invalid(trigger: &TriggerConfig, reason: impl Into<String>) -> EnqueuerError {
    EnqueuerError::InvalidTriggerOptions {
        trigger_id: trigger.id.clone(),
        kind: trigger.kind,
        reason: reason.into(),
    }
}
