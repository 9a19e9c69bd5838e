// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use hz_core::test_support::function_with_trigger;
use hz_core::{EventState, SequentialIdGen};
use hz_queue::QueueError;
use serde_json::json;

fn setup() -> (EnqueuerContext, mpsc::UnboundedReceiver<EnqueueFailure>, FunctionDef) {
    let (errors, rx) = ErrorChannel::new();
    let ctx = EnqueuerContext::with_ids(EventQueue::new(), errors, SequentialIdGen::new("evt"));
    let function = function_with_trigger("thumbs", TriggerKind::PubSub, json!({"topic": "t"}))
        .with_env("BUCKET", "images");
    (ctx, rx, function)
}

#[test]
fn emit_enqueues_with_function_env() {
    let (ctx, _rx, function) = setup();
    let trigger = function.triggers[0].clone();

    let id = ctx.emit(&function, &trigger, json!({"n": 1})).unwrap();

    assert_eq!(id, "evt-1");
    let event = ctx.queue().get(&id).unwrap();
    assert_eq!(event.state, EventState::Pending);
    assert_eq!(event.env.get("BUCKET").map(String::as_str), Some("images"));
    assert_eq!(event.target.trigger_id, Some(TriggerId::new("t1")));
}

#[test]
fn oversized_payload_is_reported_not_queued() {
    let (ctx, mut rx, function) = setup();
    let ctx = ctx.with_max_payload_bytes(16);
    let trigger = function.triggers[0].clone();

    assert!(ctx.emit(&function, &trigger, json!({"data": "x".repeat(64)})).is_none());

    let failure = rx.try_recv().unwrap();
    assert_eq!(failure.function_id, "thumbs");
    assert!(matches!(failure.error, EnqueuerError::PayloadTooLarge { max: 16, .. }));
    assert_eq!(ctx.queue().len_pending(), 0);
}

#[test]
fn duplicate_ids_surface_as_queue_errors() {
    let (errors, mut rx) = ErrorChannel::new();
    let ctx = EnqueuerContext::with_ids(EventQueue::new(), errors, FixedIds);
    let function = function_with_trigger("f", TriggerKind::Http, json!({}));
    let trigger = function.triggers[0].clone();

    assert!(ctx.emit(&function, &trigger, json!({})).is_some());
    assert!(ctx.emit(&function, &trigger, json!({})).is_none());

    let failure = rx.try_recv().unwrap();
    assert_eq!(
        failure.error,
        EnqueuerError::Queue(QueueError::DuplicateEvent(EventId::new("same")))
    );
}

#[test]
fn log_only_channel_does_not_fail() {
    let ctx = EnqueuerContext::new(EventQueue::new(), ErrorChannel::log_only()).with_max_payload_bytes(1);
    let function = function_with_trigger("f", TriggerKind::Http, json!({}));
    let trigger = function.triggers[0].clone();
    assert!(ctx.emit(&function, &trigger, json!({"big": true})).is_none());
}

#[derive(Clone)]
struct FixedIds;

impl IdGen for FixedIds {
    fn next(&self) -> String {
        "same".to_string()
    }
}
