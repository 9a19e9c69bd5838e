// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::context::ErrorChannel;
use crate::fake::{BrokerAck, FakeMessageBroker};
use hz_core::test_support::function_with_trigger;
use hz_core::{ExecutionOutcome, TriggerKind};
use hz_queue::{EventFilter, EventQueue};
use serde_json::json;
use std::time::Duration;
use yare::parameterized;

struct Harness {
    queue: EventQueue,
    broker: FakeMessageBroker,
    enqueuer: MessageQueueEnqueuer,
    failures: mpsc::UnboundedReceiver<crate::context::EnqueueFailure>,
}

fn harness(ctx_max_payload: Option<usize>) -> Harness {
    let queue = EventQueue::new();
    let (errors, failures) = ErrorChannel::new();
    let mut ctx = EnqueuerContext::new(queue.clone(), errors);
    if let Some(max) = ctx_max_payload {
        ctx = ctx.with_max_payload_bytes(max);
    }
    let broker = FakeMessageBroker::new();
    let function = Arc::new(function_with_trigger(
        "mailer",
        TriggerKind::MessageQueue,
        json!({ "queue": "outbox", "prefetch": 4 }),
    ));
    let trigger = function.triggers[0].clone();
    let enqueuer = MessageQueueEnqueuer::register(function, &trigger, &ctx, Arc::new(broker.clone())).unwrap();
    Harness {
        queue,
        broker,
        enqueuer,
        failures,
    }
}

fn ack(tag: u64) -> BrokerAck {
    BrokerAck::Ack {
        queue: "outbox".to_string(),
        tag,
    }
}

fn requeue(tag: u64) -> BrokerAck {
    BrokerAck::Nack {
        queue: "outbox".to_string(),
        tag,
        requeue: true,
    }
}

#[parameterized(
    missing_queue = { json!({}) },
    blank_queue = { json!({"queue": ""}) },
    zero_prefetch = { json!({"queue": "q", "prefetch": 0}) },
    unknown_field = { json!({"queue": "q", "exchange": "x"}) },
)]
fn invalid_options_are_rejected(options: serde_json::Value) {
    let ctx = EnqueuerContext::new(EventQueue::new(), ErrorChannel::log_only());
    let function = Arc::new(function_with_trigger("f", TriggerKind::MessageQueue, options));
    let trigger = function.triggers[0].clone();
    let result = MessageQueueEnqueuer::register(function, &trigger, &ctx, Arc::new(FakeMessageBroker::new()));
    assert!(matches!(
        result,
        Err(EnqueuerError::InvalidTriggerOptions { kind: TriggerKind::MessageQueue, .. })
    ));
}

#[test]
fn prefetch_defaults() {
    let options: MessageQueueOptions = serde_json::from_value(json!({"queue": "q"})).unwrap();
    assert_eq!(options.prefetch(), DEFAULT_PREFETCH);
}

#[tokio::test]
async fn delivery_is_acked_after_assignment() {
    let h = harness(None);
    h.enqueuer.start();
    h.broker.wait_for_consumes(1).await;
    assert_eq!(h.broker.consumes(), vec![("outbox".to_string(), 4)]);

    let delivery = Delivery::new(7, br#"{"to":"a@b.c"}"#.to_vec()).with_header("priority", "high");
    assert!(h.broker.publish("outbox", delivery).await);

    let event = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if h.queue.len_pending() == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
    })
    .await;
    assert!(event.is_ok());
    // Pending events are not yet acked to the broker
    assert!(h.broker.acks().is_empty());

    let event = h.queue.try_pop(&EventFilter::any()).unwrap();
    assert_eq!(event.payload["body"]["to"], "a@b.c");
    assert_eq!(event.payload["headers"]["priority"], "high");
    assert_eq!(event.payload["redelivered"], false);

    h.broker.wait_for_acks(1).await;
    assert_eq!(h.broker.acks(), vec![ack(7)]);

    h.queue.ack(&event.id, &ExecutionOutcome::completed(json!(null))).unwrap();
    h.enqueuer.stop().await;
    assert_eq!(h.broker.acks(), vec![ack(7)]);
}

#[tokio::test]
async fn text_bodies_are_kept_as_strings() {
    let h = harness(None);
    h.enqueuer.start();
    h.broker.wait_for_consumes(1).await;
    h.broker.publish("outbox", Delivery::new(1, b"hello".to_vec())).await;

    let event = tokio::time::timeout(Duration::from_secs(5), h.queue.pop(&EventFilter::any()))
        .await
        .unwrap();
    assert_eq!(event.payload["body"], "hello");
    h.enqueuer.stop().await;
}

#[tokio::test]
async fn stop_before_assignment_requeues_delivery() {
    let h = harness(None);
    h.enqueuer.start();
    h.broker.wait_for_consumes(1).await;
    h.broker.publish("outbox", Delivery::new(3, b"{}".to_vec())).await;

    tokio::time::timeout(Duration::from_secs(5), async {
        while h.queue.len_pending() == 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    h.enqueuer.stop().await;
    assert_eq!(h.broker.acks(), vec![requeue(3)]);
}

#[tokio::test]
async fn malformed_bodies_are_acked_and_reported() {
    let mut h = harness(None);
    h.enqueuer.start();
    h.broker.wait_for_consumes(1).await;
    h.broker.publish("outbox", Delivery::new(9, vec![0xff, 0xfe])).await;

    h.broker.wait_for_acks(1).await;
    assert_eq!(h.broker.acks(), vec![ack(9)]);
    let failure = h.failures.recv().await.unwrap();
    assert!(matches!(failure.error, EnqueuerError::Malformed(_)));
    assert_eq!(h.queue.len_pending(), 0);
    h.enqueuer.stop().await;
}

#[tokio::test]
async fn oversized_payloads_are_acked_and_reported() {
    let mut h = harness(Some(32));
    h.enqueuer.start();
    h.broker.wait_for_consumes(1).await;
    let body = format!("\"{}\"", "x".repeat(64));
    h.broker.publish("outbox", Delivery::new(2, body.into_bytes())).await;

    h.broker.wait_for_acks(1).await;
    assert_eq!(h.broker.acks(), vec![ack(2)]);
    let failure = h.failures.recv().await.unwrap();
    assert!(matches!(failure.error, EnqueuerError::PayloadTooLarge { max: 32, .. }));
    h.enqueuer.stop().await;
}

#[tokio::test(start_paused = true)]
async fn reconsumes_after_disconnect() {
    let h = harness(None);
    h.broker.fail_next_consumes(1);
    h.enqueuer.start();
    h.broker.wait_for_consumes(1).await;

    h.broker.disconnect("outbox");
    h.broker.wait_for_consumes(2).await;

    assert!(h.broker.publish("outbox", Delivery::new(5, b"1".to_vec()).redelivered()).await);
    let event = tokio::time::timeout(Duration::from_secs(5), h.queue.pop(&EventFilter::any()))
        .await
        .unwrap();
    assert_eq!(event.payload["redelivered"], true);
    h.broker.wait_for_acks(1).await;
    h.enqueuer.stop().await;
}
