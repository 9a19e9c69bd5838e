// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use hz_core::test_support::{event_of_kind, http_event};
use hz_core::{FakeClock, TriggerKind};
use proptest::prelude::*;
use serde_json::json;
use std::collections::HashSet;
use std::time::Duration;

fn queue() -> EventQueue {
    EventQueue::with_clock(QueueConfig::default(), FakeClock::at_epoch_ms(5_000))
}

fn id(s: &str) -> EventId {
    EventId::new(s)
}

#[test]
fn enqueue_stamps_time_and_resets_state() {
    let q = queue();
    let mut event = http_event("e1", "fn");
    event.state = EventState::Running;
    event.attempts = 4;
    q.enqueue(event).unwrap();

    let stored = q.get(&id("e1")).unwrap();
    assert_eq!(stored.state, EventState::Pending);
    assert_eq!(stored.attempts, 0);
    assert_eq!(stored.enqueued_at_ms, 5_000);
    assert_eq!(q.len_pending(), 1);
}

#[test]
fn enqueue_rejects_duplicate_ids() {
    let q = queue();
    q.enqueue(http_event("e1", "fn")).unwrap();
    assert_eq!(
        q.enqueue(http_event("e1", "other")),
        Err(QueueError::DuplicateEvent(id("e1")))
    );
    assert_eq!(q.len_pending(), 1);
}

#[test]
fn enqueue_rejects_ids_of_retired_events() {
    let q = queue();
    q.enqueue(http_event("e1", "fn")).unwrap();
    q.try_pop(&EventFilter::any()).unwrap();
    q.ack(&id("e1"), &ExecutionOutcome::completed(json!(null)))
        .unwrap();

    assert_eq!(
        q.enqueue(http_event("e1", "fn")),
        Err(QueueError::DuplicateEvent(id("e1")))
    );
}

#[test]
fn pop_is_fifo_and_marks_assigned() {
    let q = queue();
    for n in 1..=3 {
        q.enqueue(http_event(&format!("e{n}"), "fn")).unwrap();
    }

    let first = q.try_pop(&EventFilter::any()).unwrap();
    assert_eq!(first.id, "e1");
    assert_eq!(first.state, EventState::Assigned);
    assert_eq!(q.try_pop(&EventFilter::any()).unwrap().id, "e2");
    assert_eq!(q.try_pop(&EventFilter::any()).unwrap().id, "e3");
    assert!(q.try_pop(&EventFilter::any()).is_none());
}

#[test]
fn pop_respects_filter_and_keeps_order_within_class() {
    let q = queue();
    q.enqueue(http_event("h1", "fn")).unwrap();
    q.enqueue(event_of_kind("s1", "fn", TriggerKind::Schedule, json!({})))
        .unwrap();
    q.enqueue(http_event("h2", "fn")).unwrap();
    q.enqueue(event_of_kind("s2", "fn", TriggerKind::Schedule, json!({})))
        .unwrap();

    let schedules = EventFilter::triggers([TriggerKind::Schedule]);
    assert_eq!(q.try_pop(&schedules).unwrap().id, "s1");
    assert_eq!(q.try_pop(&schedules).unwrap().id, "s2");
    assert!(q.try_pop(&schedules).is_none());
    assert_eq!(q.try_pop(&EventFilter::any()).unwrap().id, "h1");
}

#[test]
fn full_lifecycle_reaches_completed() {
    let q = queue();
    q.enqueue(http_event("e1", "fn")).unwrap();
    q.try_pop(&EventFilter::any()).unwrap();
    q.mark_running(&id("e1")).unwrap();

    let done = q
        .ack(&id("e1"), &ExecutionOutcome::completed(json!({ "ok": true })))
        .unwrap();
    assert_eq!(done.state, EventState::Completed);
    assert!(q.get(&id("e1")).is_none(), "terminal events leave the active set");
    assert_eq!(q.state_of(&id("e1")), Some(EventState::Completed));

    let stats = q.stats();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.pending + stats.assigned + stats.running, 0);
}

#[test]
fn failed_outcome_maps_to_failed_state() {
    let q = queue();
    q.enqueue(http_event("e1", "fn")).unwrap();
    q.try_pop(&EventFilter::any()).unwrap();
    let done = q
        .ack(&id("e1"), &ExecutionOutcome::failed("TypeError"))
        .unwrap();
    assert_eq!(done.state, EventState::Failed);
}

#[test]
fn ack_of_pending_event_is_invalid() {
    let q = queue();
    q.enqueue(http_event("e1", "fn")).unwrap();
    assert_eq!(
        q.ack(&id("e1"), &ExecutionOutcome::completed(json!(null))),
        Err(QueueError::InvalidTransition {
            id: id("e1"),
            from: EventState::Pending,
            to: EventState::Completed,
        })
    );
}

#[test]
fn mark_running_requires_assigned() {
    let q = queue();
    q.enqueue(http_event("e1", "fn")).unwrap();
    assert!(matches!(
        q.mark_running(&id("e1")),
        Err(QueueError::InvalidTransition { .. })
    ));
    assert_eq!(q.mark_running(&id("missing")), Err(QueueError::NotFound(id("missing"))));
}

#[test]
fn first_nack_requeues_at_original_position() {
    let q = queue();
    q.enqueue(http_event("e1", "fn")).unwrap();
    q.enqueue(http_event("e2", "fn")).unwrap();

    let first = q.try_pop(&EventFilter::any()).unwrap();
    assert_eq!(first.id, "e1");
    assert_eq!(
        q.nack(&id("e1"), "worker disconnected").unwrap(),
        NackOutcome::Requeued
    );

    // e1 keeps its place ahead of e2
    let again = q.try_pop(&EventFilter::any()).unwrap();
    assert_eq!(again.id, "e1");
    assert_eq!(again.attempts, 1);
    assert_eq!(q.stats().requeued, 1);
}

#[test]
fn second_nack_fails_the_event() {
    let q = queue();
    q.enqueue(http_event("e1", "fn")).unwrap();

    q.try_pop(&EventFilter::any()).unwrap();
    assert_eq!(q.nack(&id("e1"), "first").unwrap(), NackOutcome::Requeued);
    q.try_pop(&EventFilter::any()).unwrap();
    q.mark_running(&id("e1")).unwrap();
    assert_eq!(q.nack(&id("e1"), "second").unwrap(), NackOutcome::Failed);

    assert_eq!(q.state_of(&id("e1")), Some(EventState::Failed));
    assert!(q.try_pop(&EventFilter::any()).is_none());
    assert_eq!(
        q.nack(&id("e1"), "third"),
        Err(QueueError::AlreadyTerminal {
            id: id("e1"),
            state: EventState::Failed,
        })
    );
}

#[test]
fn nack_of_pending_event_is_invalid() {
    let q = queue();
    q.enqueue(http_event("e1", "fn")).unwrap();
    assert!(matches!(
        q.nack(&id("e1"), "nope"),
        Err(QueueError::InvalidTransition {
            from: EventState::Pending,
            ..
        })
    ));
}

#[test]
fn timeout_wins_over_late_ack() {
    let q = queue();
    q.enqueue(http_event("e1", "fn")).unwrap();
    q.try_pop(&EventFilter::any()).unwrap();
    q.mark_running(&id("e1")).unwrap();

    assert_eq!(q.time_out(&id("e1")).unwrap().state, EventState::TimedOut);
    assert_eq!(
        q.ack(&id("e1"), &ExecutionOutcome::completed(json!(null))),
        Err(QueueError::AlreadyTerminal {
            id: id("e1"),
            state: EventState::TimedOut,
        })
    );
    // A nack racing the kill must not resurrect the event
    assert!(q.nack(&id("e1"), "killed").is_err());
    assert_eq!(q.state_of(&id("e1")), Some(EventState::TimedOut));
    assert_eq!(q.stats().timed_out, 1);
}

#[test]
fn retained_terminal_ids_are_bounded() {
    let q = EventQueue::with_config(QueueConfig {
        retained_terminal: 2,
    });
    for n in 1..=3 {
        let event_id = format!("e{n}");
        q.enqueue(http_event(&event_id, "fn")).unwrap();
        q.try_pop(&EventFilter::any()).unwrap();
        q.ack(&id(&event_id), &ExecutionOutcome::completed(json!(null)))
            .unwrap();
    }

    assert_eq!(q.state_of(&id("e1")), None, "oldest id evicted");
    assert_eq!(q.state_of(&id("e3")), Some(EventState::Completed));
    assert!(q.enqueue(http_event("e1", "fn")).is_ok());
}

#[tokio::test]
async fn pop_waits_for_enqueue() {
    let q = queue();
    let popper = {
        let q = q.clone();
        tokio::spawn(async move { q.pop(&EventFilter::any()).await })
    };
    tokio::task::yield_now().await;
    assert!(!popper.is_finished());

    q.enqueue(http_event("late", "fn")).unwrap();
    let event = tokio::time::timeout(Duration::from_secs(1), popper)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.id, "late");
    assert_eq!(event.state, EventState::Assigned);
}

#[tokio::test]
async fn pop_wakes_on_requeue() {
    let q = queue();
    q.enqueue(http_event("e1", "fn")).unwrap();
    q.try_pop(&EventFilter::any()).unwrap();

    let popper = {
        let q = q.clone();
        tokio::spawn(async move { q.pop(&EventFilter::any()).await })
    };
    tokio::task::yield_now().await;

    q.nack(&id("e1"), "disconnect").unwrap();
    let event = tokio::time::timeout(Duration::from_secs(1), popper)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.id, "e1");
}

#[tokio::test]
async fn dropped_pop_does_not_lose_events() {
    let q = queue();
    let cancelled = tokio::time::timeout(Duration::from_millis(10), q.pop(&EventFilter::any())).await;
    assert!(cancelled.is_err());

    q.enqueue(http_event("e1", "fn")).unwrap();
    assert_eq!(q.len_pending(), 1);
    assert_eq!(q.pop(&EventFilter::any()).await.id, "e1");
}

#[tokio::test]
async fn watch_follows_transitions() {
    let q = queue();
    q.enqueue(http_event("e1", "fn")).unwrap();
    let mut rx = q.watch(&id("e1")).unwrap();
    assert_eq!(*rx.borrow(), EventState::Pending);

    q.try_pop(&EventFilter::any()).unwrap();
    rx.wait_for(|s| *s == EventState::Assigned).await.unwrap();

    q.ack(&id("e1"), &ExecutionOutcome::failed("boom")).unwrap();
    let terminal = *rx.wait_for(|s| s.is_terminal()).await.unwrap();
    assert_eq!(terminal, EventState::Failed);

    // Watching after retirement yields the terminal state
    let late = q.watch(&id("e1")).unwrap();
    assert_eq!(*late.borrow(), EventState::Failed);
    assert!(q.watch(&id("unknown")).is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_pops_never_share_an_event() {
    let q = queue();
    let total = 200;
    for n in 0..total {
        q.enqueue(http_event(&format!("e{n}"), "fn")).unwrap();
    }

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let q = q.clone();
        tasks.push(tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(event) = q.try_pop(&EventFilter::any()) {
                seen.push(event.id);
                tokio::task::yield_now().await;
            }
            seen
        }));
    }

    let mut all = HashSet::new();
    let mut count = 0;
    for task in tasks {
        for event_id in task.await.unwrap() {
            count += 1;
            assert!(all.insert(event_id), "event popped twice");
        }
    }
    assert_eq!(count, total);
    assert_eq!(q.stats().assigned, total);
}

#[derive(Debug, Clone)]
enum Op {
    Pop,
    Running(usize),
    Ack(usize),
    Fail(usize),
    Nack(usize),
    TimeOut(usize),
}

fn op_strategy(n: usize) -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Pop),
        2 => (0..n).prop_map(Op::Running),
        2 => (0..n).prop_map(Op::Ack),
        1 => (0..n).prop_map(Op::Fail),
        2 => (0..n).prop_map(Op::Nack),
        1 => (0..n).prop_map(Op::TimeOut),
    ]
}

proptest! {
    /// Whatever sequence of worker reports arrives, a terminal event keeps
    /// its terminal state and no event is handed out while in flight.
    #[test]
    fn terminal_states_are_sticky(ops in prop::collection::vec(op_strategy(6), 1..80)) {
        let q = queue();
        let ids: Vec<EventId> = (0..6).map(|n| id(&format!("e{n}"))).collect();
        for event_id in &ids {
            q.enqueue(http_event(event_id.as_str(), "fn")).unwrap();
        }

        let mut terminal: HashMap<EventId, EventState> = HashMap::new();
        let mut in_flight: HashSet<EventId> = HashSet::new();

        for op in ops {
            match op {
                Op::Pop => {
                    if let Some(event) = q.try_pop(&EventFilter::any()) {
                        prop_assert!(in_flight.insert(event.id.clone()), "double assignment");
                        prop_assert!(!terminal.contains_key(&event.id));
                    }
                }
                Op::Running(i) => { let _ = q.mark_running(&ids[i]); }
                Op::Ack(i) => { let _ = q.ack(&ids[i], &ExecutionOutcome::completed(json!(null))); }
                Op::Fail(i) => { let _ = q.ack(&ids[i], &ExecutionOutcome::failed("x")); }
                Op::Nack(i) => { let _ = q.nack(&ids[i], "x"); }
                Op::TimeOut(i) => { let _ = q.time_out(&ids[i]); }
            }

            for event_id in &ids {
                let state = q.state_of(event_id).unwrap();
                if let Some(previous) = terminal.get(event_id) {
                    prop_assert_eq!(*previous, state);
                } else if state.is_terminal() {
                    terminal.insert(event_id.clone(), state);
                }
                if !state.is_in_flight() {
                    in_flight.remove(event_id);
                }
            }
        }
    }
}
