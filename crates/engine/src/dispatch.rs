// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The dispatch loop.
//!
//! One task owns the slot table and waits on, in priority order: control
//! requests, worker messages, the nearest deadline, and a pending event
//! (only while some slot is Idle). Every slot transition happens here.

use crate::config::HorizonConfig;
use crate::results::ResultSink;
use crate::slot::{Assignment, SlotTable};
use crate::status::{FatalAlert, PoolStatus};
use hz_adapters::{OutputCapture, WorkerAdapter, WorkerError, WorkerMessage, WorkerSpawnConfig};
use hz_core::{Event, EventId, ExecutionOutcome, ExecutionResult, WorkerId, WorkerStatus};
use hz_queue::{EventQueue, NackOutcome, QueueError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, Instant};

pub(crate) enum Control {
    Stop {
        grace: Duration,
        reply: oneshot::Sender<PoolStatus>,
    },
}

enum Wake {
    Control(Option<Control>),
    Message(WorkerMessage),
    Deadline,
    Popped(Event),
}

struct Stopping {
    deadline: Instant,
    replies: Vec<oneshot::Sender<PoolStatus>>,
}

pub(crate) struct Dispatcher<W: WorkerAdapter> {
    config: HorizonConfig,
    queue: EventQueue,
    adapter: W,
    capture: OutputCapture,
    results: Arc<dyn ResultSink>,
    epoch_ms: Arc<dyn Fn() -> u64 + Send + Sync>,
    slots: SlotTable,
    control_rx: mpsc::Receiver<Control>,
    control_open: bool,
    msg_tx: mpsc::Sender<WorkerMessage>,
    msg_rx: mpsc::Receiver<WorkerMessage>,
    status_tx: watch::Sender<PoolStatus>,
    alert_tx: mpsc::UnboundedSender<FatalAlert>,
    crashes: u64,
    stopping: Option<Stopping>,
}

impl<W: WorkerAdapter> Dispatcher<W> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: HorizonConfig,
        queue: EventQueue,
        adapter: W,
        capture: OutputCapture,
        results: Arc<dyn ResultSink>,
        epoch_ms: Arc<dyn Fn() -> u64 + Send + Sync>,
        control_rx: mpsc::Receiver<Control>,
        status_tx: watch::Sender<PoolStatus>,
        alert_tx: mpsc::UnboundedSender<FatalAlert>,
        message_capacity: usize,
    ) -> Self {
        let (msg_tx, msg_rx) = mpsc::channel(message_capacity);
        let slots = SlotTable::new(config.pool_size, config.crash_loop);
        Self {
            config,
            queue,
            adapter,
            capture,
            results,
            epoch_ms,
            slots,
            control_rx,
            control_open: true,
            msg_tx,
            msg_rx,
            status_tx,
            alert_tx,
            crashes: 0,
            stopping: None,
        }
    }

    pub(crate) async fn run(mut self) {
        tracing::info!(pool_size = self.slots.len(), "horizon starting");
        for index in self.slots.indices() {
            self.spawn(index).await;
        }
        self.publish(false);

        loop {
            if self.ready_to_stop() {
                break;
            }
            let deadline = self.next_deadline();
            let can_pop = self.stopping.is_none() && self.slots.has_idle();

            let wake = tokio::select! {
                biased;
                control = self.control_rx.recv(), if self.control_open => Wake::Control(control),
                Some(msg) = self.msg_rx.recv() => Wake::Message(msg),
                _ = time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => Wake::Deadline,
                event = self.queue.pop(&self.config.filter), if can_pop => Wake::Popped(event),
            };

            match wake {
                Wake::Control(Some(Control::Stop { grace, reply })) => self.begin_stop(grace, Some(reply)),
                Wake::Control(None) => {
                    // Handle dropped without stop
                    self.control_open = false;
                    self.begin_stop(Duration::ZERO, None);
                }
                Wake::Message(msg) => self.on_message(msg).await,
                Wake::Deadline => self.on_deadlines().await,
                Wake::Popped(event) => self.assign(event).await,
            }
            self.publish(false);
        }

        self.shutdown().await;
    }

    // ── Stop ────────────────────────────────────────────────────────────────

    fn begin_stop(&mut self, grace: Duration, reply: Option<oneshot::Sender<PoolStatus>>) {
        let stopping = self.stopping.get_or_insert_with(|| {
            tracing::info!(grace_ms = grace.as_millis() as u64, "horizon stopping");
            Stopping {
                deadline: Instant::now() + grace,
                replies: Vec::new(),
            }
        });
        stopping.replies.extend(reply);
        for index in self.slots.indices() {
            self.slots[index].respawn_at = None;
        }
    }

    fn ready_to_stop(&self) -> bool {
        match &self.stopping {
            Some(stopping) => self.slots.busy() == 0 || Instant::now() >= stopping.deadline,
            None => false,
        }
    }

    /// Force-kill what is left; in-flight events go back to the queue.
    async fn shutdown(&mut self) {
        for index in self.slots.indices() {
            if let Some(assignment) = self.slots[index].assignment.take() {
                tracing::warn!(
                    worker_id = %self.slots[index].worker_id,
                    event_id = %assignment.event_id,
                    "grace expired, returning event to queue"
                );
                let worker_id = self.slots[index].worker_id.clone();
                self.requeue(&worker_id, &assignment, "horizon stopped");
            }
            self.release(index).await;
            self.slots[index].respawn_at = None;
        }

        let status = self.publish(true);
        if let Some(stopping) = self.stopping.take() {
            for reply in stopping.replies {
                let _ = reply.send(status.clone());
            }
        }
        tracing::info!(crashes = self.crashes, "horizon stopped");
    }

    // ── Worker messages ─────────────────────────────────────────────────────

    async fn on_message(&mut self, msg: WorkerMessage) {
        let Some(index) = self.slots.index_of(msg.worker_id()) else {
            tracing::warn!(worker_id = %msg.worker_id(), message = msg.name(), "message from unknown worker");
            return;
        };
        if !self.slots[index].accepts(msg.generation()) {
            tracing::debug!(
                worker_id = %msg.worker_id(),
                generation = msg.generation(),
                current = self.slots[index].generation,
                message = msg.name(),
                "stale worker message ignored"
            );
            return;
        }

        match msg {
            WorkerMessage::Ready { .. } => self.on_ready(index),
            WorkerMessage::Claimed { event_id, .. } => self.on_claimed(index, &event_id),
            WorkerMessage::Completed {
                event_id, output, ..
            } => self.on_report(index, &event_id, ExecutionOutcome::completed(output)),
            WorkerMessage::Failed { event_id, error, .. } => {
                self.on_report(index, &event_id, ExecutionOutcome::failed(error))
            }
            WorkerMessage::Nacked {
                event_id, reason, ..
            } => self.on_nacked(index, &event_id, &reason),
            WorkerMessage::Exited { exit_code, .. } => self.on_exit(index, exit_code).await,
        }
    }

    fn on_ready(&mut self, index: usize) {
        let slot = &mut self.slots[index];
        if slot.status != WorkerStatus::Starting {
            return;
        }
        slot.status = WorkerStatus::Idle;
        slot.spawn_deadline = None;
        tracing::info!(worker_id = %slot.worker_id, generation = slot.generation, "worker ready");
    }

    fn on_claimed(&mut self, index: usize, event_id: &EventId) {
        let slot = &mut self.slots[index];
        let Some(assignment) = slot.assignment.as_mut().filter(|a| &a.event_id == event_id) else {
            tracing::warn!(worker_id = %slot.worker_id, %event_id, "claim for an event this worker does not hold");
            return;
        };
        assignment.claimed = true;
        if let Err(e) = self.queue.mark_running(event_id) {
            tracing::warn!(%event_id, error = %e, "could not mark event running");
        }
    }

    fn on_report(&mut self, index: usize, event_id: &EventId, outcome: ExecutionOutcome) {
        let Some(assignment) = self.take_assignment(index, event_id) else {
            return;
        };
        let worker_id = self.slots[index].worker_id.clone();
        self.slots[index].status = WorkerStatus::Idle;

        match self.queue.ack(event_id, &outcome) {
            Ok(_) => self.record(&worker_id, &assignment, outcome),
            Err(QueueError::AlreadyTerminal { state, .. }) => {
                tracing::warn!(%worker_id, %event_id, %state, "late report rejected");
            }
            Err(e) => tracing::warn!(%worker_id, %event_id, error = %e, "ack failed"),
        }
    }

    fn on_nacked(&mut self, index: usize, event_id: &EventId, reason: &str) {
        let Some(assignment) = self.take_assignment(index, event_id) else {
            return;
        };
        let worker_id = self.slots[index].worker_id.clone();
        self.slots[index].status = WorkerStatus::Idle;
        self.requeue(&worker_id, &assignment, reason);
    }

    async fn on_exit(&mut self, index: usize, exit_code: Option<i32>) {
        let reason = match exit_code {
            Some(code) => format!("worker exited with code {code}"),
            None => "worker killed by signal".to_string(),
        };
        let slot = &mut self.slots[index];
        tracing::warn!(
            worker_id = %slot.worker_id,
            generation = slot.generation,
            status = %slot.status,
            exit_code,
            "worker exited unexpectedly"
        );
        let worker_id = slot.worker_id.clone();
        if let Some(assignment) = slot.assignment.take() {
            self.requeue(&worker_id, &assignment, &reason);
        }
        self.release(index).await;
        self.crashed(index, reason);
    }

    fn take_assignment(&mut self, index: usize, event_id: &EventId) -> Option<Assignment> {
        let slot = &mut self.slots[index];
        if !slot.is_assigned(event_id) {
            tracing::warn!(worker_id = %slot.worker_id, %event_id, "report for an event this worker does not hold");
            return None;
        }
        slot.assignment.take()
    }

    // ── Deadlines ───────────────────────────────────────────────────────────

    fn next_deadline(&self) -> Option<Instant> {
        let slots = self.slots.next_deadline();
        let stop = self.stopping.as_ref().map(|s| s.deadline);
        match (slots, stop) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    async fn on_deadlines(&mut self) {
        for index in self.slots.due(Instant::now()) {
            match self.slots[index].status {
                WorkerStatus::Busy => self.time_out(index).await,
                WorkerStatus::Starting => self.spawn_timed_out(index).await,
                WorkerStatus::Dead if self.stopping.is_none() => self.spawn(index).await,
                _ => self.slots[index].respawn_at = None,
            }
        }
    }

    async fn time_out(&mut self, index: usize) {
        let Some(assignment) = self.slots[index].assignment.take() else {
            return;
        };
        let worker_id = self.slots[index].worker_id.clone();
        let elapsed = assignment.started_at.elapsed();
        tracing::warn!(
            %worker_id,
            event_id = %assignment.event_id,
            function_id = %assignment.target.function_id,
            elapsed_ms = elapsed.as_millis() as u64,
            "execution timed out, killing worker"
        );

        match self.queue.time_out(&assignment.event_id) {
            Ok(_) => self.record(&worker_id, &assignment, ExecutionOutcome::TimedOut),
            Err(e) => tracing::warn!(event_id = %assignment.event_id, error = %e, "timeout not applied"),
        }
        self.release(index).await;
        self.schedule_respawn(index);
    }

    async fn spawn_timed_out(&mut self, index: usize) {
        let timeout = self.config.spawn_timeout;
        tracing::warn!(
            worker_id = %self.slots[index].worker_id,
            timeout_ms = timeout.as_millis() as u64,
            "worker never became ready"
        );
        self.release(index).await;
        self.crashed(index, format!("not ready within {timeout:?}"));
    }

    // ── Slot lifecycle ──────────────────────────────────────────────────────

    async fn spawn(&mut self, index: usize) {
        let spawn_timeout = self.config.spawn_timeout;
        let slot = &mut self.slots[index];
        slot.generation += 1;
        slot.status = WorkerStatus::Starting;
        slot.respawn_at = None;
        slot.spawn_deadline = Some(Instant::now() + spawn_timeout);
        let config = WorkerSpawnConfig::new(slot.worker_id.clone(), slot.generation);
        let (worker_id, generation) = (config.worker_id.clone(), config.generation);

        let spawned = time::timeout(self.config.call_timeout, self.adapter.spawn(config, self.msg_tx.clone())).await;
        let error = match spawned {
            Ok(Ok(handle)) => {
                tracing::info!(%worker_id, generation, pid = handle.pid, "worker spawned");
                self.slots[index].handle = Some(handle);
                return;
            }
            Ok(Err(e)) => format!("spawn failed: {e}"),
            Err(_) => "spawn timed out".to_string(),
        };
        tracing::warn!(%worker_id, generation, error = %error, "worker spawn failed");
        let slot = &mut self.slots[index];
        slot.status = WorkerStatus::Dead;
        slot.spawn_deadline = None;
        self.crashed(index, error);
    }

    /// Kill the slot's process, if any, leaving the slot Dead.
    async fn release(&mut self, index: usize) {
        let slot = &mut self.slots[index];
        slot.spawn_deadline = None;
        let Some(handle) = slot.handle.take() else {
            slot.status = WorkerStatus::Dead;
            return;
        };
        slot.status = WorkerStatus::Killing;

        match time::timeout(self.config.call_timeout, self.adapter.kill(&handle)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(worker_id = %handle.worker_id, error = %e, "kill failed"),
            Err(_) => tracing::warn!(worker_id = %handle.worker_id, "kill timed out"),
        }
        self.slots[index].status = WorkerStatus::Dead;
    }

    fn schedule_respawn(&mut self, index: usize) {
        if self.stopping.is_some() {
            return;
        }
        self.slots[index].respawn_at = Some(Instant::now());
    }

    /// Count an unexpected exit; retire the slot once it is crash-looping.
    fn crashed(&mut self, index: usize, reason: String) {
        self.crashes += 1;
        let window = self.config.crash_loop.window;
        let slot = &mut self.slots[index];
        if !slot.crashes.record(Instant::now()) {
            self.schedule_respawn(index);
            return;
        }

        slot.retired = true;
        slot.respawn_at = None;
        let alert = FatalAlert {
            worker_id: slot.worker_id.clone(),
            crashes: slot.crashes.recent(Instant::now()),
            window,
            reason,
        };
        tracing::error!(
            worker_id = %alert.worker_id,
            crashes = alert.crashes,
            reason = %alert.reason,
            "crash loop, slot retired"
        );
        let _ = self.alert_tx.send(alert);
    }

    // ── Dispatch ────────────────────────────────────────────────────────────

    async fn assign(&mut self, event: Event) {
        let Some(index) = self.slots.first_idle() else {
            // Only popped while a slot is Idle
            tracing::error!(event_id = %event.id, "popped with no idle worker");
            let _ = self.queue.nack(&event.id, "no idle worker");
            return;
        };
        let slot = &mut self.slots[index];
        let Some(handle) = slot.handle.clone() else {
            tracing::error!(worker_id = %slot.worker_id, "idle worker without a process");
            let _ = self.queue.nack(&event.id, "no idle worker");
            return;
        };

        let now = Instant::now();
        let timeout = event.timeout().unwrap_or(self.config.default_timeout);
        let assignment = Assignment {
            event_id: event.id.clone(),
            target: event.target.clone(),
            started_at: now,
            deadline: now + timeout,
            claimed: false,
        };
        slot.status = WorkerStatus::Busy;
        slot.assignment = Some(assignment);
        tracing::debug!(
            worker_id = %handle.worker_id,
            event_id = %event.id,
            function_id = %event.target.function_id,
            timeout_ms = timeout.as_millis() as u64,
            "assigning event"
        );

        let output = self.capture.open(&event.id, event.function_id());
        let assigned = time::timeout(self.config.call_timeout, self.adapter.assign(&handle, event, output)).await;
        let reason = match assigned {
            Ok(Ok(())) => return,
            Ok(Err(WorkerError::Busy(worker_id))) => {
                tracing::error!(%worker_id, "assertion failed: assigned to a busy worker");
                format!("worker {worker_id} busy")
            }
            Ok(Err(e)) => {
                tracing::warn!(worker_id = %handle.worker_id, error = %e, "assignment failed");
                format!("assignment failed: {e}")
            }
            Err(_) => {
                tracing::warn!(worker_id = %handle.worker_id, "assignment timed out");
                "assignment timed out".to_string()
            }
        };

        let worker_id = handle.worker_id.clone();
        if let Some(assignment) = self.slots[index].assignment.take() {
            self.requeue(&worker_id, &assignment, &reason);
        }
        self.release(index).await;
        self.crashed(index, reason);
    }

    // ── Queue + results ─────────────────────────────────────────────────────

    /// Nack an in-flight event; a second nack fails it.
    fn requeue(&self, worker_id: &WorkerId, assignment: &Assignment, reason: &str) {
        match self.queue.nack(&assignment.event_id, reason) {
            Ok(NackOutcome::Requeued) => {}
            Ok(NackOutcome::Failed) => self.record(
                worker_id,
                assignment,
                ExecutionOutcome::failed(format!("nacked twice: {reason}")),
            ),
            Err(e) => tracing::warn!(event_id = %assignment.event_id, error = %e, "nack failed"),
        }
    }

    fn record(&self, worker_id: &WorkerId, assignment: &Assignment, outcome: ExecutionOutcome) {
        let duration_ms = assignment.started_at.elapsed().as_millis() as u64;
        tracing::info!(
            %worker_id,
            event_id = %assignment.event_id,
            function_id = %assignment.target.function_id,
            outcome = ?outcome.kind(),
            duration_ms,
            "execution finished"
        );
        self.results.record(&ExecutionResult {
            event_id: assignment.event_id.clone(),
            target: assignment.target.clone(),
            outcome,
            worker_id: Some(worker_id.clone()),
            duration_ms,
            finished_at_ms: (self.epoch_ms)(),
        });
    }

    fn publish(&mut self, stopped: bool) -> PoolStatus {
        let status = PoolStatus::from_slots(self.slots.summaries(Instant::now()), self.crashes, stopped);
        let snapshot = status.clone();
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
        snapshot
    }
}
