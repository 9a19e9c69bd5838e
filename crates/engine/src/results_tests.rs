// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use hz_core::{EventTarget, TriggerKind, WorkerId};
use serde_json::json;
use tempfile::tempdir;

fn result(event: &str, outcome: ExecutionOutcome) -> ExecutionResult {
    ExecutionResult {
        event_id: event.into(),
        target: EventTarget::new("thumbs", TriggerKind::Http),
        outcome,
        worker_id: Some(WorkerId::for_slot(0)),
        duration_ms: 1_200,
        finished_at_ms: 0,
    }
}

#[test]
fn activity_log_appends_one_line_per_result() {
    let dir = tempdir().unwrap();
    let log = ActivityLog::new(dir.path().join("logs"));

    log.record(&result("e1", ExecutionOutcome::completed(json!({"ok": true}))));
    log.record(&result("e2", ExecutionOutcome::failed("bad input")));
    log.record(&result("e3", ExecutionOutcome::TimedOut));

    let content = std::fs::read_to_string(dir.path().join("logs/function/thumbs.log")).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].ends_with("[completed] e1 (http) on worker-0 in 1.2s"), "{}", lines[0]);
    assert!(lines[1].ends_with("[failed] e2 (http) on worker-0 in 1.2s: bad input"), "{}", lines[1]);
    assert!(lines[2].contains("[timed_out] e3"));
    assert_eq!(lines[0].chars().nth(10), Some('T'));
}

#[test]
fn activity_log_is_stamped_with_the_finish_time() {
    let dir = tempdir().unwrap();
    let log = ActivityLog::new(dir.path().join("logs"));
    let finished = ExecutionResult {
        finished_at_ms: 1_769_760_849_250,
        ..result("e1", ExecutionOutcome::completed(json!(null)))
    };

    log.record(&finished);

    let content = std::fs::read_to_string(dir.path().join("logs/function/thumbs.log")).unwrap();
    assert!(
        content.starts_with("2026-01-30T08:14:09.250Z [completed] e1 (http)"),
        "{content}"
    );
}

#[test]
fn activity_log_failures_are_swallowed() {
    let dir = tempdir().unwrap();
    // A file where the log directory should be
    let blocked = dir.path().join("logs");
    std::fs::write(&blocked, "").unwrap();

    ActivityLog::new(&blocked).record(&result("e1", ExecutionOutcome::TimedOut));
    assert!(blocked.is_file());
}

#[test]
fn fan_out_reaches_every_sink() {
    let a = MemoryResultSink::new();
    let b = MemoryResultSink::new();
    let sink = FanOutResultSink::new(vec![Arc::new(a.clone()), Arc::new(NoOpResultSink), Arc::new(b.clone())]);

    sink.record(&result("e1", ExecutionOutcome::TimedOut));
    assert_eq!(a.len(), 1);
    assert_eq!(b.results()[0].event_id, "e1");
}
