//! Graceful stop: finish what fits in the grace period, requeue the rest.

use crate::prelude::*;

#[tokio::test(start_paused = true)]
async fn stop_lets_short_executions_finish() {
    let stack = Stack::start(1).await;
    stack.deploy(http_function("thumbs")).await;
    stack
        .workers
        .push_behavior(FakeBehavior::complete_after(Duration::from_millis(300)));

    let invocation = stack.invoke("thumbs", post("thumbs")).unwrap();
    let event_id = invocation.event_id().clone();
    stack.wait_state(&event_id, EventState::Running).await;

    let queue = stack.queue.clone();
    let status = stack.shutdown(Duration::from_secs(2)).await;
    assert!(status.stopped);
    assert_eq!(queue.state_of(&event_id), Some(EventState::Completed));
    assert_eq!(finish(invocation).await, EventState::Completed);
}

#[tokio::test(start_paused = true)]
async fn stop_returns_unfinished_work_to_the_queue() {
    let stack = Stack::start(1).await;
    stack.deploy(http_function("thumbs")).await;
    stack.workers.push_behavior(FakeBehavior::Hang);

    let invocation = stack.invoke("thumbs", post("thumbs")).unwrap();
    let event_id = invocation.event_id().clone();
    stack.wait_state(&event_id, EventState::Running).await;

    let queue = stack.queue.clone();
    let workers = stack.workers.clone();
    let started = Instant::now();
    let status = stack.shutdown(Duration::from_millis(500)).await;
    assert!(started.elapsed() >= Duration::from_millis(500));
    assert!(status.stopped);
    assert_eq!(queue.state_of(&event_id), Some(EventState::Pending));
    assert_eq!(workers.live_workers(), 0);
}

#[tokio::test(start_paused = true)]
async fn stopped_triggers_reject_new_invocations() {
    let stack = Stack::start(1).await;
    stack.deploy(http_function("thumbs")).await;
    let routes = stack.registry.http(&FunctionId::new("thumbs")).unwrap();

    stack.shutdown(Duration::ZERO).await;
    let err = routes.invoke(post("thumbs")).unwrap_err();
    assert_eq!(err, EnqueuerError::Stopped);
}
