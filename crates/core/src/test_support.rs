// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::{Event, EventTarget, FunctionDef, TriggerConfig, TriggerKind};
use std::time::Duration;

// ── Event factory functions ─────────────────────────────────────────────────

/// Pending HTTP event for `function_id` with an empty payload.
pub fn http_event(id: &str, function_id: &str) -> Event {
    Event::new(
        id,
        EventTarget::new(function_id, TriggerKind::Http),
        serde_json::json!({}),
    )
}

/// Pending event of the given kind carrying `payload`.
pub fn event_of_kind(id: &str, function_id: &str, kind: TriggerKind, payload: serde_json::Value) -> Event {
    Event::new(id, EventTarget::new(function_id, kind), payload)
}

/// Pending HTTP event with an explicit timeout.
pub fn timed_event(id: &str, function_id: &str, timeout: Duration) -> Event {
    http_event(id, function_id).with_timeout(timeout)
}

// ── Function definitions ────────────────────────────────────────────────────

/// Function definition with a single trigger.
pub fn function_with_trigger(
    function_id: &str,
    kind: TriggerKind,
    options: serde_json::Value,
) -> FunctionDef {
    FunctionDef::new(function_id, format!("/artifacts/{}.js", function_id))
        .with_trigger(TriggerConfig::new("t1", kind, options))
}
