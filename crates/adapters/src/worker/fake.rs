// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake worker adapter for testing
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{WorkerAdapter, WorkerError, WorkerHandle, WorkerMessage, WorkerSpawnConfig};
use crate::output::OutputPair;
use async_trait::async_trait;
use hz_core::{Event, EventId, WorkerId};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// What a fake worker does with its next assignment
#[derive(Debug, Clone, PartialEq)]
pub enum FakeBehavior {
    Complete {
        after: Duration,
        output: serde_json::Value,
    },
    Fail {
        after: Duration,
        error: String,
    },
    Nack {
        after: Duration,
        reason: String,
    },
    /// Claim the event and never report back
    Hang,
    /// Claim the event, then exit
    Crash {
        after: Duration,
        exit_code: Option<i32>,
    },
    /// Write to the output sinks right after claiming, then behave as `then`
    Output {
        stdout: String,
        stderr: String,
        then: Box<FakeBehavior>,
    },
}

impl FakeBehavior {
    pub fn complete() -> Self {
        Self::complete_after(Duration::ZERO)
    }

    pub fn complete_after(after: Duration) -> Self {
        FakeBehavior::Complete {
            after,
            output: serde_json::Value::Null,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        FakeBehavior::Fail {
            after: Duration::ZERO,
            error: error.into(),
        }
    }

    pub fn nack(reason: impl Into<String>) -> Self {
        FakeBehavior::Nack {
            after: Duration::ZERO,
            reason: reason.into(),
        }
    }

    pub fn crash_after(after: Duration) -> Self {
        FakeBehavior::Crash {
            after,
            exit_code: Some(1),
        }
    }

    pub fn with_output(self, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        FakeBehavior::Output {
            stdout: stdout.into(),
            stderr: stderr.into(),
            then: Box::new(self),
        }
    }
}

/// Recorded adapter call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerCall {
    Spawn { worker_id: WorkerId, generation: u64 },
    Assign {
        worker_id: WorkerId,
        generation: u64,
        event_id: EventId,
    },
    Kill { worker_id: WorkerId, generation: u64 },
}

type OutputCell = Arc<Mutex<Option<OutputPair>>>;

struct FakeWorker {
    generation: u64,
    tx: mpsc::Sender<WorkerMessage>,
    alive: bool,
    busy: bool,
    task: Option<JoinHandle<()>>,
    output: OutputCell,
}

struct FakeWorkerState {
    workers: HashMap<WorkerId, FakeWorker>,
    behaviors: VecDeque<FakeBehavior>,
    default_behavior: FakeBehavior,
    spawn_failures: usize,
    silent_spawns: usize,
    ready_delay: Duration,
    calls: Vec<WorkerCall>,
    busy_now: usize,
    max_busy: usize,
}

impl FakeWorkerState {
    fn live_mut(&mut self, worker_id: &WorkerId, generation: u64) -> Option<&mut FakeWorker> {
        self.workers
            .get_mut(worker_id)
            .filter(|w| w.generation == generation && w.alive)
    }

    fn set_idle(&mut self, worker_id: &WorkerId, generation: u64) {
        let mut released = false;
        if let Some(worker) = self.live_mut(worker_id, generation) {
            if worker.busy {
                worker.busy = false;
                released = true;
            }
            if let Some(mut pair) = worker.output.lock().take() {
                pair.close();
            }
        }
        if released {
            self.busy_now = self.busy_now.saturating_sub(1);
        }
    }
}

/// Scriptable in-memory worker pool.
///
/// Assignments consume behaviors pushed with [`push_behavior`]
/// (falling back to the default, an instant completion). Cloning shares
/// the script and the recorded calls.
///
/// [`push_behavior`]: FakeWorkerAdapter::push_behavior
#[derive(Clone)]
pub struct FakeWorkerAdapter {
    inner: Arc<Mutex<FakeWorkerState>>,
}

impl Default for FakeWorkerAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeWorkerAdapter {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeWorkerState {
                workers: HashMap::new(),
                behaviors: VecDeque::new(),
                default_behavior: FakeBehavior::complete(),
                spawn_failures: 0,
                silent_spawns: 0,
                ready_delay: Duration::ZERO,
                calls: Vec::new(),
                busy_now: 0,
                max_busy: 0,
            })),
        }
    }

    /// Queue the behavior for the next assignment
    pub fn push_behavior(&self, behavior: FakeBehavior) {
        self.inner.lock().behaviors.push_back(behavior);
    }

    /// Behavior used once the queue is empty
    pub fn set_default_behavior(&self, behavior: FakeBehavior) {
        self.inner.lock().default_behavior = behavior;
    }

    /// Make the next `n` spawns fail
    pub fn fail_next_spawns(&self, n: usize) {
        self.inner.lock().spawn_failures = n;
    }

    /// Make the next `n` spawns start but never report Ready
    pub fn hang_next_spawns(&self, n: usize) {
        self.inner.lock().silent_spawns = n;
    }

    /// Delay between spawn and Ready
    pub fn set_ready_delay(&self, delay: Duration) {
        self.inner.lock().ready_delay = delay;
    }

    /// Make an idle worker exit on its own.
    pub fn crash_idle(&self, worker_id: &WorkerId) -> bool {
        let mut state = self.inner.lock();
        let Some(worker) = state.workers.get_mut(worker_id).filter(|w| w.alive) else {
            return false;
        };
        worker.alive = false;
        let _ = worker.tx.try_send(WorkerMessage::Exited {
            worker_id: worker_id.clone(),
            generation: worker.generation,
            exit_code: Some(1),
        });
        true
    }

    pub fn calls(&self) -> Vec<WorkerCall> {
        self.inner.lock().calls.clone()
    }

    /// (worker, event) pairs in assignment order
    pub fn assignments(&self) -> Vec<(WorkerId, EventId)> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                WorkerCall::Assign {
                    worker_id,
                    event_id,
                    ..
                } => Some((worker_id.clone(), event_id.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn spawn_count(&self) -> usize {
        self.count(|c| matches!(c, WorkerCall::Spawn { .. }))
    }

    pub fn kill_count(&self) -> usize {
        self.count(|c| matches!(c, WorkerCall::Kill { .. }))
    }

    /// Highest number of simultaneously busy workers seen
    pub fn max_busy(&self) -> usize {
        self.inner.lock().max_busy
    }

    pub fn live_workers(&self) -> usize {
        self.inner.lock().workers.values().filter(|w| w.alive).count()
    }

    fn count(&self, f: impl Fn(&WorkerCall) -> bool) -> usize {
        self.inner.lock().calls.iter().filter(|c| f(c)).count()
    }

    /// Send `msg` if the generation is still live; optionally release the
    /// worker first.
    fn report(&self, worker_id: &WorkerId, generation: u64, msg: WorkerMessage, release: bool) {
        let mut state = self.inner.lock();
        let Some(tx) = state.live_mut(worker_id, generation).map(|w| w.tx.clone()) else {
            return;
        };
        if release {
            state.set_idle(worker_id, generation);
        }
        let _ = tx.try_send(msg);
    }

    async fn run(
        self,
        worker_id: WorkerId,
        generation: u64,
        event_id: EventId,
        behavior: FakeBehavior,
        output: OutputCell,
    ) {
        self.report(
            &worker_id,
            generation,
            WorkerMessage::Claimed {
                worker_id: worker_id.clone(),
                generation,
                event_id: event_id.clone(),
            },
            false,
        );

        let mut behavior = behavior;
        while let FakeBehavior::Output {
            stdout,
            stderr,
            then,
        } = behavior
        {
            if let Some(pair) = output.lock().as_mut() {
                let _ = pair.stdout.write(stdout.as_bytes());
                let _ = pair.stderr.write(stderr.as_bytes());
            }
            behavior = *then;
        }

        let id = worker_id.clone();
        let msg = match behavior {
            FakeBehavior::Complete { after, output } => {
                tokio::time::sleep(after).await;
                WorkerMessage::Completed {
                    worker_id: id,
                    generation,
                    event_id,
                    output,
                }
            }
            FakeBehavior::Fail { after, error } => {
                tokio::time::sleep(after).await;
                WorkerMessage::Failed {
                    worker_id: id,
                    generation,
                    event_id,
                    error,
                }
            }
            FakeBehavior::Nack { after, reason } => {
                tokio::time::sleep(after).await;
                WorkerMessage::Nacked {
                    worker_id: id,
                    generation,
                    event_id,
                    reason,
                }
            }
            FakeBehavior::Crash { after, exit_code } => {
                tokio::time::sleep(after).await;
                let mut state = self.inner.lock();
                if let Some(worker) = state.live_mut(&worker_id, generation) {
                    worker.alive = false;
                    worker.busy = false;
                    let _ = worker.tx.try_send(WorkerMessage::Exited {
                        worker_id: id,
                        generation,
                        exit_code,
                    });
                    state.busy_now = state.busy_now.saturating_sub(1);
                }
                return;
            }
            FakeBehavior::Hang => std::future::pending().await,
            FakeBehavior::Output { .. } => return,
        };
        self.report(&worker_id, generation, msg, true);
    }
}

#[async_trait]
impl WorkerAdapter for FakeWorkerAdapter {
    async fn spawn(
        &self,
        config: WorkerSpawnConfig,
        tx: mpsc::Sender<WorkerMessage>,
    ) -> Result<WorkerHandle, WorkerError> {
        let worker_id = config.worker_id;
        let generation = config.generation;
        let (silent, delay) = {
            let mut state = self.inner.lock();
            state.calls.push(WorkerCall::Spawn {
                worker_id: worker_id.clone(),
                generation,
            });
            if state.spawn_failures > 0 {
                state.spawn_failures -= 1;
                return Err(WorkerError::SpawnFailed("injected spawn failure".into()));
            }
            let silent = state.silent_spawns > 0;
            if silent {
                state.silent_spawns -= 1;
            }
            state.workers.insert(
                worker_id.clone(),
                FakeWorker {
                    generation,
                    tx,
                    alive: true,
                    busy: false,
                    task: None,
                    output: Arc::new(Mutex::new(None)),
                },
            );
            (silent, state.ready_delay)
        };

        if !silent {
            let adapter = self.clone();
            let id = worker_id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let msg = WorkerMessage::Ready {
                    worker_id: id.clone(),
                    generation,
                };
                adapter.report(&id, generation, msg, false);
            });
        }

        Ok(WorkerHandle {
            worker_id,
            generation,
            pid: None,
        })
    }

    async fn assign(
        &self,
        handle: &WorkerHandle,
        event: Event,
        output: OutputPair,
    ) -> Result<(), WorkerError> {
        let mut state = self.inner.lock();
        let behavior = {
            let Some(worker) = state.live_mut(&handle.worker_id, handle.generation) else {
                return Err(WorkerError::NotFound(handle.worker_id.clone()));
            };
            if worker.busy {
                return Err(WorkerError::Busy(handle.worker_id.clone()));
            }
            worker.busy = true;
            *worker.output.lock() = Some(output);
            let cell = Arc::clone(&worker.output);
            let behavior = state
                .behaviors
                .pop_front()
                .unwrap_or_else(|| state.default_behavior.clone());
            (behavior, cell)
        };
        state.busy_now += 1;
        state.max_busy = state.max_busy.max(state.busy_now);
        state.calls.push(WorkerCall::Assign {
            worker_id: handle.worker_id.clone(),
            generation: handle.generation,
            event_id: event.id.clone(),
        });

        let (behavior, cell) = behavior;
        let task = tokio::spawn(self.clone().run(
            handle.worker_id.clone(),
            handle.generation,
            event.id,
            behavior,
            cell,
        ));
        if let Some(worker) = state.live_mut(&handle.worker_id, handle.generation) {
            worker.task = Some(task);
        }
        Ok(())
    }

    async fn kill(&self, handle: &WorkerHandle) -> Result<(), WorkerError> {
        let mut state = self.inner.lock();
        state.calls.push(WorkerCall::Kill {
            worker_id: handle.worker_id.clone(),
            generation: handle.generation,
        });
        let matches = state
            .workers
            .get(&handle.worker_id)
            .is_some_and(|w| w.generation == handle.generation);
        if !matches {
            return Ok(());
        }
        if let Some(worker) = state.workers.remove(&handle.worker_id) {
            if let Some(task) = worker.task {
                task.abort();
            }
            if let Some(mut pair) = worker.output.lock().take() {
                pair.close();
            }
            if worker.busy && worker.alive {
                state.busy_now = state.busy_now.saturating_sub(1);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
