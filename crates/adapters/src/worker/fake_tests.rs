// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::output::{FakeLogCollector, OutputCapture, OutputStream};
use hz_core::test_support::http_event;
use hz_core::WorkerId;

struct Rig {
    fake: FakeWorkerAdapter,
    collector: FakeLogCollector,
    capture: OutputCapture,
    rx: mpsc::Receiver<WorkerMessage>,
    tx: mpsc::Sender<WorkerMessage>,
}

fn rig() -> Rig {
    let collector = FakeLogCollector::new();
    let (tx, rx) = mpsc::channel(32);
    Rig {
        fake: FakeWorkerAdapter::new(),
        capture: OutputCapture::new(collector.clone()),
        collector,
        rx,
        tx,
    }
}

impl Rig {
    async fn spawn(&mut self, slot: usize, generation: u64) -> WorkerHandle {
        let config = WorkerSpawnConfig::new(WorkerId::for_slot(slot), generation);
        let handle = self.fake.spawn(config, self.tx.clone()).await.unwrap();
        assert!(matches!(self.rx.recv().await, Some(WorkerMessage::Ready { .. })));
        handle
    }

    async fn assign(&self, handle: &WorkerHandle, id: &str) -> Result<(), WorkerError> {
        let event = http_event(id, "thumbs");
        let output = self.capture.open(&event.id, &event.target.function_id);
        self.fake.assign(handle, event, output).await
    }
}

#[tokio::test(start_paused = true)]
async fn default_behavior_completes_instantly() {
    let mut rig = rig();
    let handle = rig.spawn(0, 1).await;
    rig.assign(&handle, "e1").await.unwrap();

    assert!(matches!(rig.rx.recv().await, Some(WorkerMessage::Claimed { .. })));
    match rig.rx.recv().await {
        Some(WorkerMessage::Completed { event_id, .. }) => assert_eq!(event_id, "e1"),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(rig.fake.assignments(), vec![(WorkerId::for_slot(0), EventId::new("e1"))]);
    assert!(rig.collector.is_closed("e1", OutputStream::Stdout));
}

#[tokio::test(start_paused = true)]
async fn complete_after_waits_for_the_delay() {
    let mut rig = rig();
    let handle = rig.spawn(0, 1).await;
    rig.fake
        .push_behavior(FakeBehavior::complete_after(Duration::from_secs(2)));
    let start = tokio::time::Instant::now();
    rig.assign(&handle, "e1").await.unwrap();

    rig.rx.recv().await; // claimed
    assert!(matches!(rig.rx.recv().await, Some(WorkerMessage::Completed { .. })));
    assert!(start.elapsed() >= Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn second_assignment_while_busy_is_rejected() {
    let mut rig = rig();
    let handle = rig.spawn(0, 1).await;
    rig.fake.push_behavior(FakeBehavior::Hang);
    rig.assign(&handle, "e1").await.unwrap();

    let err = rig.assign(&handle, "e2").await.unwrap_err();
    assert!(matches!(err, WorkerError::Busy(_)));
    assert_eq!(rig.fake.max_busy(), 1);
}

#[tokio::test(start_paused = true)]
async fn crash_reports_exit_and_leaves_worker_dead() {
    let mut rig = rig();
    let handle = rig.spawn(0, 1).await;
    rig.fake
        .push_behavior(FakeBehavior::crash_after(Duration::from_millis(10)));
    rig.assign(&handle, "e1").await.unwrap();

    rig.rx.recv().await; // claimed
    assert!(matches!(
        rig.rx.recv().await,
        Some(WorkerMessage::Exited { exit_code: Some(1), .. })
    ));
    assert_eq!(rig.fake.live_workers(), 0);
    assert!(matches!(rig.assign(&handle, "e2").await, Err(WorkerError::NotFound(_))));
}

#[tokio::test(start_paused = true)]
async fn output_is_written_before_the_result() {
    let mut rig = rig();
    let handle = rig.spawn(0, 1).await;
    rig.fake
        .push_behavior(FakeBehavior::fail("boom").with_output("hello\n", "trace\n"));
    rig.assign(&handle, "e1").await.unwrap();

    rig.rx.recv().await; // claimed
    match rig.rx.recv().await {
        Some(WorkerMessage::Failed { error, .. }) => assert_eq!(error, "boom"),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(rig.collector.text("e1", OutputStream::Stdout), "hello\n");
    assert_eq!(rig.collector.text("e1", OutputStream::Stderr), "trace\n");
}

#[tokio::test(start_paused = true)]
async fn kill_silences_the_generation_and_closes_output() {
    let mut rig = rig();
    let handle = rig.spawn(0, 1).await;
    rig.fake.push_behavior(FakeBehavior::complete_after(Duration::from_secs(5)));
    rig.assign(&handle, "e1").await.unwrap();
    rig.rx.recv().await; // claimed

    rig.fake.kill(&handle).await.unwrap();
    rig.fake.kill(&handle).await.unwrap();
    assert!(rig.collector.is_closed("e1", OutputStream::Stdout));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(rig.rx.try_recv().is_err());
    assert_eq!(rig.fake.kill_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn injected_spawn_failures_are_consumed() {
    let mut rig = rig();
    rig.fake.fail_next_spawns(1);
    let config = WorkerSpawnConfig::new(WorkerId::for_slot(0), 1);
    let err = rig.fake.spawn(config, rig.tx.clone()).await.unwrap_err();
    assert!(matches!(err, WorkerError::SpawnFailed(_)));

    rig.spawn(0, 2).await;
    assert_eq!(rig.fake.spawn_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn hung_spawn_never_reports_ready() {
    let mut rig = rig();
    rig.fake.hang_next_spawns(1);
    let config = WorkerSpawnConfig::new(WorkerId::for_slot(0), 1);
    rig.fake.spawn(config, rig.tx.clone()).await.unwrap();

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(rig.rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn idle_crash_reports_exit() {
    let mut rig = rig();
    rig.spawn(1, 3).await;
    assert!(rig.fake.crash_idle(&WorkerId::for_slot(1)));
    assert!(matches!(
        rig.rx.recv().await,
        Some(WorkerMessage::Exited { generation: 3, .. })
    ));
    assert!(!rig.fake.crash_idle(&WorkerId::for_slot(1)));
}
