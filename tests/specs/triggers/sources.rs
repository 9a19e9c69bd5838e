//! Change-stream, message-queue and pub/sub triggers end to end.

use crate::prelude::*;

fn with_trigger(id: &str, kind: TriggerKind, options: serde_json::Value) -> FunctionDef {
    FunctionDef::new(id, format!("/srv/functions/{id}.js")).with_trigger(TriggerConfig::new("source", kind, options))
}

fn change(operation: ChangeOperation, bucket: &str, document_id: &str, token: &str) -> ChangeEvent {
    ChangeEvent {
        operation,
        bucket: bucket.to_string(),
        document_id: document_id.to_string(),
        document: Some(json!({"name": document_id})),
        resume_token: token.to_string(),
    }
}

#[tokio::test(start_paused = true)]
async fn document_changes_run_the_function() {
    let stack = Stack::start(1).await;
    stack
        .deploy(with_trigger("index", TriggerKind::ChangeStream, json!({"bucket": "uploads"})))
        .await;
    stack.changes.wait_for_watches(1).await;

    assert!(stack.changes.push(change(ChangeOperation::Insert, "other", "x", "t0")).await);
    assert!(stack.changes.push(change(ChangeOperation::Insert, "uploads", "a.png", "t1")).await);

    let results = stack.wait_results(1).await;
    assert_eq!(results[0].target.function_id, "index");
    assert_eq!(results[0].target.trigger, TriggerKind::ChangeStream);
    assert!(results[0].outcome.state().is_terminal());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(stack.results.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn change_stream_resumes_after_a_dropped_connection() {
    let stack = Stack::start(1).await;
    stack
        .deploy(with_trigger("index", TriggerKind::ChangeStream, json!({"bucket": "uploads"})))
        .await;
    stack.changes.wait_for_watches(1).await;
    assert!(stack.changes.push(change(ChangeOperation::Insert, "uploads", "a.png", "t1")).await);
    stack.wait_results(1).await;

    stack.changes.disconnect();
    stack.changes.wait_for_watches(2).await;
    assert_eq!(
        stack.changes.watches()[1],
        ("uploads".to_string(), Some("t1".to_string()))
    );

    assert!(stack.changes.push(change(ChangeOperation::Insert, "uploads", "b.png", "t2")).await);
    assert_eq!(stack.wait_results(2).await.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn broker_delivery_is_acked_once_a_worker_takes_it() {
    let stack = Stack::start(1).await;
    stack
        .deploy(with_trigger("mailer", TriggerKind::MessageQueue, json!({"queue": "outbox"})))
        .await;
    stack.broker.wait_for_consumes(1).await;
    stack
        .workers
        .push_behavior(FakeBehavior::complete_after(Duration::from_secs(1)));

    assert!(stack.broker.publish("outbox", Delivery::new(1, br#"{"to":"a@example.com"}"#.to_vec())).await);
    assert!(stack.broker.publish("outbox", Delivery::new(2, br#"{"to":"b@example.com"}"#.to_vec())).await);

    stack.broker.wait_for_acks(1).await;
    // The second delivery waits behind the busy worker, unacknowledged
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(
        stack.broker.acks(),
        vec![BrokerAck::Ack {
            queue: "outbox".into(),
            tag: 1
        }]
    );

    stack.broker.wait_for_acks(2).await;
    let results = stack.wait_results(2).await;
    assert!(results.iter().all(|r| r.target.trigger == TriggerKind::MessageQueue));
}

#[tokio::test(start_paused = true)]
async fn undecodable_delivery_is_dropped_and_acked() {
    let stack = Stack::start(1).await;
    stack
        .deploy(with_trigger("mailer", TriggerKind::MessageQueue, json!({"queue": "outbox"})))
        .await;
    stack.broker.wait_for_consumes(1).await;

    assert!(stack.broker.publish("outbox", Delivery::new(9, vec![0xff, 0xfe])).await);
    stack.broker.wait_for_acks(1).await;
    assert_eq!(
        stack.broker.acks(),
        vec![BrokerAck::Ack {
            queue: "outbox".into(),
            tag: 9
        }]
    );
    assert_eq!(stack.queue.stats().pending, 0);
    assert!(stack.results.is_empty());
}

#[tokio::test(start_paused = true)]
async fn pub_sub_messages_run_the_function() {
    let stack = Stack::start(2).await;
    stack
        .deploy(with_trigger("welcome", TriggerKind::PubSub, json!({"topic": "signups"})))
        .await;
    stack.pubsub.wait_for_subscriptions(1).await;

    for id in ["m1", "m2"] {
        assert!(stack.pubsub.push("signups", PubSubMessage::new(id, json!({"user": id}))).await);
    }
    stack.pubsub.wait_for_acks(2).await;
    assert_eq!(stack.pubsub.acked(), vec!["m1", "m2"]);

    let results = stack.wait_results(2).await;
    assert!(results
        .iter()
        .all(|r| r.target.function_id == "welcome" && r.outcome.state() == EventState::Completed));
}

#[tokio::test(start_paused = true)]
async fn one_function_can_listen_on_several_sources() {
    let stack = Stack::start(1).await;
    let function = http_function("sync")
        .with_trigger(TriggerConfig::new("jobs", TriggerKind::MessageQueue, json!({"queue": "sync"})))
        .with_trigger(TriggerConfig::new("feed", TriggerKind::PubSub, json!({"topic": "sync"})));
    stack.deploy(function).await;
    stack.broker.wait_for_consumes(1).await;
    stack.pubsub.wait_for_subscriptions(1).await;

    let invocation = stack.invoke("sync", post("sync")).unwrap();
    assert!(stack.broker.publish("sync", Delivery::new(1, b"now".to_vec())).await);
    assert!(stack.pubsub.push("sync", PubSubMessage::new("m1", json!(null))).await);
    assert_eq!(finish(invocation).await, EventState::Completed);

    let mut kinds: Vec<_> = stack
        .wait_results(3)
        .await
        .into_iter()
        .map(|r| r.target.trigger)
        .collect();
    kinds.sort();
    assert_eq!(kinds, vec![TriggerKind::Http, TriggerKind::MessageQueue, TriggerKind::PubSub]);
    assert_eq!(
        stack.registry.triggers(&FunctionId::new("sync")),
        vec![
            (TriggerKind::Http, true),
            (TriggerKind::MessageQueue, true),
            (TriggerKind::PubSub, true),
        ]
    );
}
