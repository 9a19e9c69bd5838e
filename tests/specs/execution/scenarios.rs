//! End-to-end execution: HTTP trigger → queue → pool → result.

use crate::prelude::*;

#[tokio::test(start_paused = true)]
async fn invocation_completes_within_its_timeout() {
    let stack = Stack::start(1).await;
    stack
        .deploy(http_function("thumbs").with_timeout(Duration::from_secs(5)))
        .await;
    stack.workers.push_behavior(FakeBehavior::Complete {
        after: Duration::from_secs(1),
        output: json!({"status": 200, "body": "ok"}),
    });

    let started = Instant::now();
    let invocation = stack.invoke("thumbs", post("thumbs").with_body(json!({"w": 64}))).unwrap();
    let event_id = invocation.event_id().clone();
    assert_eq!(finish(invocation).await, EventState::Completed);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(1) && elapsed < Duration::from_millis(1100), "{elapsed:?}");

    let result = stack.result_of(&event_id);
    assert_eq!(result.outcome, ExecutionOutcome::completed(json!({"status": 200, "body": "ok"})));
    assert_eq!(result.target.function_id, "thumbs");
    assert_eq!(result.target.trigger, TriggerKind::Http);

    let status = stack.wait_idle().await;
    assert_eq!(status.crashes, 0);
}

#[tokio::test(start_paused = true)]
async fn single_worker_serves_invocations_in_arrival_order() {
    let stack = Stack::start(1).await;
    stack.deploy(http_function("thumbs")).await;
    stack
        .workers
        .set_default_behavior(FakeBehavior::complete_after(Duration::from_millis(50)));

    let invocations: Vec<_> = (0..3)
        .map(|_| stack.invoke("thumbs", post("thumbs")).unwrap())
        .collect();
    let ids: Vec<EventId> = invocations.iter().map(|i| i.event_id().clone()).collect();
    for invocation in invocations {
        assert_eq!(finish(invocation).await, EventState::Completed);
    }

    let finished: Vec<_> = stack.results.results().into_iter().map(|r| r.event_id).collect();
    assert_eq!(finished, ids);
    assert_eq!(stack.workers.max_busy(), 1);
}

#[tokio::test(start_paused = true)]
async fn hung_function_times_out_and_its_worker_is_replaced() {
    let stack = Stack::start(1).await;
    stack
        .deploy(http_function("thumbs").with_timeout(Duration::from_secs(1)))
        .await;
    stack.workers.push_behavior(FakeBehavior::Hang);

    let started = Instant::now();
    let invocation = stack.invoke("thumbs", post("thumbs")).unwrap();
    let event_id = invocation.event_id().clone();
    assert_eq!(finish(invocation).await, EventState::TimedOut);
    assert!(started.elapsed() >= Duration::from_secs(1));

    let status = stack.wait_idle().await;
    assert!(started.elapsed() < Duration::from_millis(1100), "{:?}", started.elapsed());
    assert_eq!(stack.result_of(&event_id).outcome, ExecutionOutcome::TimedOut);
    assert_eq!(status.slot(0).unwrap().generation, 2);

    // The replacement worker serves the next invocation
    let next = stack.invoke("thumbs", post("thumbs")).unwrap();
    assert_eq!(finish(next).await, EventState::Completed);
}

#[tokio::test(start_paused = true)]
async fn crashed_worker_hands_the_event_to_another() {
    let stack = Stack::start(2).await;
    stack.deploy(http_function("thumbs")).await;
    stack
        .workers
        .push_behavior(FakeBehavior::crash_after(Duration::from_millis(100)));

    let invocation = stack.invoke("thumbs", post("thumbs")).unwrap();
    let event_id = invocation.event_id().clone();
    assert_eq!(finish(invocation).await, EventState::Completed);

    let workers: Vec<_> = stack
        .workers
        .assignments()
        .into_iter()
        .filter(|(_, id)| id == &event_id)
        .map(|(worker, _)| worker)
        .collect();
    assert_eq!(workers, vec![WorkerId::for_slot(0), WorkerId::for_slot(1)]);
    assert_eq!(stack.queue.stats().requeued, 1);
    assert_eq!(stack.wait_results(1).await.len(), 1);

    let status = stack.wait_idle().await;
    assert_eq!(status.crashes, 1);
}

#[tokio::test(start_paused = true)]
async fn function_error_fails_the_invocation() {
    let stack = Stack::start(1).await;
    stack.deploy(http_function("thumbs")).await;
    stack.workers.push_behavior(FakeBehavior::fail("unsupported image"));

    let invocation = stack.invoke("thumbs", post("thumbs")).unwrap();
    let event_id = invocation.event_id().clone();
    assert_eq!(finish(invocation).await, EventState::Failed);
    assert_eq!(
        stack.result_of(&event_id).outcome,
        ExecutionOutcome::failed("unsupported image")
    );
}

#[tokio::test(start_paused = true)]
async fn rejected_twice_is_failed_not_retried_forever() {
    let stack = Stack::start(1).await;
    stack.deploy(http_function("thumbs")).await;
    stack.workers.set_default_behavior(FakeBehavior::nack("cold start"));

    let invocation = stack.invoke("thumbs", post("thumbs")).unwrap();
    assert_eq!(finish(invocation).await, EventState::Failed);
    assert_eq!(stack.workers.assignments().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn events_carry_function_environment_to_the_worker() {
    let stack = Stack::start(1).await;
    stack
        .deploy(http_function("thumbs").with_env("BUCKET", "images"))
        .await;

    let invocation = stack.invoke("thumbs", post("thumbs")).unwrap();
    let event_id = invocation.event_id().clone();
    let queued = stack.queue.get(&event_id).unwrap();
    assert_eq!(queued.env.get("BUCKET").map(String::as_str), Some("images"));
    assert_eq!(queued.entrypoint.as_deref(), Some(std::path::Path::new("/srv/functions/thumbs.js")));

    assert_eq!(finish(invocation).await, EventState::Completed);
}
