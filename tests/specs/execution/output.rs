//! Function stdout/stderr lands in per-event logs.

use crate::prelude::*;

#[tokio::test(start_paused = true)]
async fn output_is_captured_per_event_and_stream() {
    let stack = Stack::start(2).await;
    stack.deploy(http_function("thumbs")).await;
    stack
        .workers
        .push_behavior(FakeBehavior::complete().with_output("resized 3 images\n", ""));
    stack
        .workers
        .push_behavior(FakeBehavior::fail("bad header").with_output("", "corrupt jpeg\n"));

    let first = stack.invoke("thumbs", post("thumbs")).unwrap();
    let second = stack.invoke("thumbs", post("thumbs")).unwrap();
    let (a, b) = (first.event_id().clone(), second.event_id().clone());
    assert_eq!(finish(first).await, EventState::Completed);
    assert_eq!(finish(second).await, EventState::Failed);

    assert_eq!(stack.output.text(a.as_str(), OutputStream::Stdout), "resized 3 images\n");
    assert_eq!(stack.output.text(a.as_str(), OutputStream::Stderr), "");
    assert_eq!(stack.output.text(b.as_str(), OutputStream::Stderr), "corrupt jpeg\n");
    for id in [&a, &b] {
        assert!(stack.output.is_closed(id.as_str(), OutputStream::Stdout));
        assert!(stack.output.is_closed(id.as_str(), OutputStream::Stderr));
    }
}

#[tokio::test(start_paused = true)]
async fn output_written_before_a_timeout_is_kept() {
    let stack = Stack::start(1).await;
    stack
        .deploy(http_function("thumbs").with_timeout(Duration::from_millis(500)))
        .await;
    stack
        .workers
        .push_behavior(FakeBehavior::Hang.with_output("starting\n", ""));

    let invocation = stack.invoke("thumbs", post("thumbs")).unwrap();
    let event_id = invocation.event_id().clone();
    assert_eq!(finish(invocation).await, EventState::TimedOut);

    stack.wait_idle().await;
    assert_eq!(stack.output.text(event_id.as_str(), OutputStream::Stdout), "starting\n");
    assert!(stack.output.is_closed(event_id.as_str(), OutputStream::Stdout));
}
