//! HTTP triggers: routing, admission and payload limits.

use crate::prelude::*;

#[tokio::test(start_paused = true)]
async fn request_snapshot_becomes_the_event_payload() {
    let stack = Stack::start(1).await;
    stack.deploy(http_function("thumbs")).await;

    let request = post("thumbs")
        .with_header("content-type", "application/json")
        .with_query("size", "64")
        .with_body(json!({"image": "cat.png"}));
    let invocation = stack.invoke("thumbs", request).unwrap();
    let event = stack.queue.get(invocation.event_id()).unwrap();
    assert_eq!(event.target.trigger, TriggerKind::Http);
    assert_eq!(event.payload["method"], "POST");
    assert_eq!(event.payload["path"], "/thumbs");
    assert_eq!(event.payload["body"], json!({"image": "cat.png"}));

    assert_eq!(finish(invocation).await, EventState::Completed);
}

#[tokio::test(start_paused = true)]
async fn unmatched_route_is_rejected_without_enqueueing() {
    let stack = Stack::start(1).await;
    stack.deploy(http_function("thumbs")).await;

    let err = stack
        .invoke("thumbs", HttpRequest::new("GET", "/thumbs"))
        .unwrap_err();
    assert!(matches!(err, EnqueuerError::NoMatchingTrigger { .. }), "{err:?}");
    assert_eq!(stack.queue.stats().pending, 0);
}

#[tokio::test(start_paused = true)]
async fn admission_limit_counts_unfinished_invocations() {
    let stack = Stack::start(1).await;
    let function = FunctionDef::new("thumbs", "/srv/functions/thumbs.js").with_trigger(TriggerConfig::new(
        "web",
        TriggerKind::Http,
        json!({"path": "/thumbs", "max_in_flight": 1}),
    ));
    stack.deploy(function).await;
    stack
        .workers
        .push_behavior(FakeBehavior::complete_after(Duration::from_millis(200)));

    let first = stack.invoke("thumbs", post("thumbs")).unwrap();
    let err = stack.invoke("thumbs", post("thumbs")).unwrap_err();
    assert!(matches!(err, EnqueuerError::TooManyInFlight { limit: 1, .. }), "{err:?}");

    assert_eq!(finish(first).await, EventState::Completed);
    // The permit is released once the first invocation is terminal
    let deadline = Instant::now() + WAIT_LIMIT;
    let second = loop {
        match stack.invoke("thumbs", post("thumbs")) {
            Ok(invocation) => break invocation,
            Err(_) => {
                assert!(Instant::now() < deadline, "admission never reopened");
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
    };
    assert_eq!(finish(second).await, EventState::Completed);
}

#[tokio::test(start_paused = true)]
async fn invalid_trigger_options_refuse_the_whole_function() {
    let stack = Stack::start(1).await;
    let function = http_function("thumbs").with_trigger(TriggerConfig::new(
        "nightly",
        TriggerKind::Schedule,
        json!({"cron": "not a cron"}),
    ));

    let err = stack.registry.register_function(function).await.unwrap_err();
    assert!(matches!(err, EnqueuerError::InvalidTriggerOptions { .. }), "{err:?}");
    assert!(stack.registry.functions().is_empty());
}
