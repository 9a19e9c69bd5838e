// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-backed worker adapter

use super::listener::WorkerListener;
use super::{WorkerAdapter, WorkerError, WorkerHandle, WorkerMessage, WorkerSpawnConfig};
use crate::output::{OutputPair, OutputSink, OutputStream};
use crate::protocol::{ENV_SOCKET, ENV_WORKER_ID, ENV_WORKER_TOKEN};
use async_trait::async_trait;
use hz_core::{Event, EventId, WorkerId};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;

/// How to start runtime processes
#[derive(Debug, Clone)]
pub struct ProcessWorkerConfig {
    /// Runtime executable
    pub command: PathBuf,
    pub args: Vec<String>,
    /// Environment shared by every worker process
    pub env: BTreeMap<String, String>,
    pub cwd: Option<PathBuf>,
    /// Where the worker socket is bound
    pub socket_path: PathBuf,
    /// How long `kill` waits for buffered output after the process is gone
    pub drain_timeout: Duration,
}

impl ProcessWorkerConfig {
    pub fn new(command: impl Into<PathBuf>, socket_path: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
            socket_path: socket_path.into(),
            drain_timeout: Duration::from_secs(1),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

type OutputCell = Arc<PipedOutput>;

/// Where the pipe pumps send what the process prints.
#[derive(Default)]
struct PipedOutput {
    slots: Mutex<OutputSlots>,
    stdout_retired: Notify,
    stderr_retired: Notify,
}

#[derive(Default)]
struct OutputSlots {
    /// Sinks of the execution in progress
    current: Option<OutputPair>,
    /// Sinks of a reported execution, closed by their pump once the pipe
    /// has given up what was written before the report
    retired_stdout: Option<OutputSink>,
    retired_stderr: Option<OutputSink>,
}

impl OutputSlots {
    fn retired_mut(&mut self, stream: OutputStream) -> &mut Option<OutputSink> {
        match stream {
            OutputStream::Stdout => &mut self.retired_stdout,
            OutputStream::Stderr => &mut self.retired_stderr,
        }
    }
}

impl PipedOutput {
    fn install(&self, pair: OutputPair) {
        self.slots.lock().current = Some(pair);
    }

    /// Hand the current sinks to the pumps to drain and close.
    fn retire(&self) {
        {
            let mut slots = self.slots.lock();
            let Some(OutputPair { stdout, stderr }) = slots.current.take() else {
                return;
            };
            // Replacing an undrained sink drops and closes it
            slots.retired_stdout = Some(stdout);
            slots.retired_stderr = Some(stderr);
        }
        self.stdout_retired.notify_one();
        self.stderr_retired.notify_one();
    }

    fn retired_notify(&self, stream: OutputStream) -> &Notify {
        match stream {
            OutputStream::Stdout => &self.stdout_retired,
            OutputStream::Stderr => &self.stderr_retired,
        }
    }

    fn write(&self, stream: OutputStream, chunk: &[u8], worker_id: &WorkerId) {
        let mut slots = self.slots.lock();
        let OutputSlots {
            current,
            retired_stdout,
            retired_stderr,
        } = &mut *slots;
        let retired = match stream {
            OutputStream::Stdout => retired_stdout,
            OutputStream::Stderr => retired_stderr,
        };
        let sink = match retired {
            Some(sink) => Some(sink),
            None => current.as_mut().map(|pair| pair.sink_mut(stream)),
        };
        match sink {
            Some(sink) => {
                if let Err(e) = sink.write(chunk) {
                    tracing::debug!(%worker_id, error = %e, "output after close");
                }
            }
            None => tracing::debug!(
                %worker_id,
                %stream,
                "idle output: {}",
                String::from_utf8_lossy(chunk).trim_end()
            ),
        }
    }

    fn close_retired(&self, stream: OutputStream) {
        if let Some(mut sink) = self.slots.lock().retired_mut(stream).take() {
            sink.close();
        }
    }

    fn close_all(&self) {
        let mut slots = self.slots.lock();
        if let Some(mut pair) = slots.current.take() {
            pair.close();
        }
        for stream in [OutputStream::Stdout, OutputStream::Stderr] {
            if let Some(mut sink) = slots.retired_mut(stream).take() {
                sink.close();
            }
        }
    }
}

enum WaiterCommand {
    /// Kill, reap, then acknowledge; the exit is not reported
    Kill(oneshot::Sender<()>),
    /// Kill but report the exit like any other crash
    Abandon,
}

/// Book-keeping for one live process generation.
struct LiveWorker {
    generation: u64,
    token: String,
    tx: mpsc::Sender<WorkerMessage>,
    assign_tx: mpsc::Sender<Event>,
    /// Taken by the connection that completes the handshake
    assign_rx: Option<mpsc::Receiver<Event>>,
    attached: bool,
    current: Option<EventId>,
    output: OutputCell,
    commands: Option<mpsc::UnboundedSender<WaiterCommand>>,
    pumps: Vec<JoinHandle<()>>,
}

impl LiveWorker {
    fn close_output(&mut self) {
        self.output.close_all();
    }
}

/// An attached worker connection as seen by the listener
pub(super) struct Session {
    pub worker_id: WorkerId,
    pub generation: u64,
    pub assign_rx: mpsc::Receiver<Event>,
}

/// Registry shared between the adapter and its socket listener.
///
/// A worker generation is live exactly while it has an entry here; `kill`
/// removes the entry, which silences everything the old process still says.
#[derive(Default)]
pub(super) struct ProcessShared {
    workers: Mutex<HashMap<WorkerId, LiveWorker>>,
}

impl ProcessShared {
    /// Match a `Hello` against a spawned, not yet attached process.
    pub(super) fn attach(&self, worker_id: &WorkerId, token: &str) -> Result<Session, String> {
        let mut workers = self.workers.lock();
        let Some(live) = workers.get_mut(worker_id) else {
            return Err(format!("unknown worker {worker_id}"));
        };
        if live.token != token {
            return Err(format!("invalid token for {worker_id}"));
        }
        if live.attached {
            return Err(format!("{worker_id} is already connected"));
        }
        let Some(assign_rx) = live.assign_rx.take() else {
            return Err(format!("{worker_id} is already connected"));
        };
        live.attached = true;
        Ok(Session {
            worker_id: worker_id.clone(),
            generation: live.generation,
            assign_rx,
        })
    }

    /// The worker popped `event_id`. False if the generation is gone or the
    /// event is no longer its assignment.
    pub(super) fn claim(&self, session: &Session, event_id: &EventId) -> bool {
        self.with_live(session, |live| live.current.as_ref() == Some(event_id))
            .unwrap_or(false)
    }

    /// The worker reported a result for `event_id`; its output closes once
    /// the pipes are drained.
    pub(super) fn finish(&self, session: &Session, event_id: &EventId) -> bool {
        self.with_live(session, |live| {
            if live.current.as_ref() != Some(event_id) {
                return false;
            }
            live.current = None;
            live.output.retire();
            true
        })
        .unwrap_or(false)
    }

    /// The connection dropped: release any assignment and take the process
    /// down so the scheduler sees an exit.
    pub(super) fn detach(&self, session: &Session) -> Option<EventId> {
        self.with_live(session, |live| {
            live.attached = false;
            if let Some(commands) = &live.commands {
                let _ = commands.send(WaiterCommand::Abandon);
            }
            let current = live.current.take();
            if current.is_some() {
                live.close_output();
            }
            current
        })
        .flatten()
    }

    /// Deliver a message if the generation is still live.
    pub(super) async fn forward(&self, worker_id: &WorkerId, generation: u64, msg: WorkerMessage) {
        // Sent under the lock when possible so a concurrent kill cannot
        // slip in between the liveness check and the send
        let (tx, msg) = {
            let workers = self.workers.lock();
            let Some(live) = workers.get(worker_id).filter(|l| l.generation == generation) else {
                tracing::debug!(%worker_id, generation, kind = msg.name(), "dropping message from dead generation");
                return;
            };
            match live.tx.try_send(msg) {
                Ok(()) | Err(mpsc::error::TrySendError::Closed(_)) => return,
                Err(mpsc::error::TrySendError::Full(msg)) => (live.tx.clone(), msg),
            }
        };
        let _ = tx.send(msg).await;
    }

    fn with_live<T>(&self, session: &Session, f: impl FnOnce(&mut LiveWorker) -> T) -> Option<T> {
        let mut workers = self.workers.lock();
        workers
            .get_mut(&session.worker_id)
            .filter(|l| l.generation == session.generation)
            .map(f)
    }

    fn remove(&self, handle: &WorkerHandle) -> Option<LiveWorker> {
        let mut workers = self.workers.lock();
        if workers
            .get(&handle.worker_id)
            .is_some_and(|l| l.generation == handle.generation)
        {
            workers.remove(&handle.worker_id)
        } else {
            None
        }
    }
}

/// Runs each worker as a child process of the host.
///
/// Processes learn where to connect from `HORIZON_SOCKET`,
/// `HORIZON_WORKER_ID` and `HORIZON_WORKER_TOKEN`; stdout and stderr are
/// piped into the output sinks of whatever the worker is executing.
#[derive(Clone)]
pub struct ProcessWorkerAdapter {
    config: Arc<ProcessWorkerConfig>,
    shared: Arc<ProcessShared>,
    listener: Arc<WorkerListener>,
}

impl ProcessWorkerAdapter {
    /// Bind the worker socket. Must be called inside a tokio runtime.
    pub fn bind(config: ProcessWorkerConfig) -> Result<Self, WorkerError> {
        let shared = Arc::new(ProcessShared::default());
        let listener = WorkerListener::bind(&config.socket_path, Arc::clone(&shared))?;
        Ok(Self {
            config: Arc::new(config),
            shared,
            listener: Arc::new(listener),
        })
    }

    pub fn socket_path(&self) -> &std::path::Path {
        self.listener.path()
    }

    pub fn live_workers(&self) -> usize {
        self.shared.workers.lock().len()
    }
}

#[async_trait]
impl WorkerAdapter for ProcessWorkerAdapter {
    async fn spawn(
        &self,
        config: WorkerSpawnConfig,
        tx: mpsc::Sender<WorkerMessage>,
    ) -> Result<WorkerHandle, WorkerError> {
        let worker_id = config.worker_id.clone();
        let generation = config.generation;
        let token = uuid::Uuid::new_v4().to_string();
        let output: OutputCell = Arc::new(PipedOutput::default());
        let (assign_tx, assign_rx) = mpsc::channel(1);

        // Registered before the process exists so an early Hello finds it
        let replaced = self.shared.workers.lock().insert(
            worker_id.clone(),
            LiveWorker {
                generation,
                token: token.clone(),
                tx: tx.clone(),
                assign_tx,
                assign_rx: Some(assign_rx),
                attached: false,
                current: None,
                output: Arc::clone(&output),
                commands: None,
                pumps: Vec::new(),
            },
        );
        if let Some(old) = replaced {
            tracing::warn!(%worker_id, old_generation = old.generation, "respawned without kill");
        }

        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args)
            .envs(&self.config.env)
            .envs(&config.env)
            .env(ENV_SOCKET, self.listener.path())
            .env(ENV_WORKER_ID, worker_id.as_str())
            .env(ENV_WORKER_TOKEN, &token)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &self.config.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                self.shared.workers.lock().remove(&worker_id);
                return Err(WorkerError::SpawnFailed(format!(
                    "{}: {e}",
                    self.config.command.display()
                )));
            }
        };
        let pid = child.id();

        let mut pumps = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            pumps.push(pump(stdout, OutputStream::Stdout, Arc::clone(&output), worker_id.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(pump(stderr, OutputStream::Stderr, Arc::clone(&output), worker_id.clone()));
        }

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        if let Some(live) = self
            .shared
            .workers
            .lock()
            .get_mut(&worker_id)
            .filter(|l| l.generation == generation)
        {
            live.commands = Some(cmd_tx);
            live.pumps = pumps;
        }
        tokio::spawn(wait_for_exit(
            child,
            cmd_rx,
            Arc::clone(&self.shared),
            worker_id.clone(),
            generation,
        ));

        Ok(WorkerHandle {
            worker_id,
            generation,
            pid,
        })
    }

    async fn assign(
        &self,
        handle: &WorkerHandle,
        event: Event,
        output: OutputPair,
    ) -> Result<(), WorkerError> {
        let assign_tx = {
            let mut workers = self.shared.workers.lock();
            let live = workers
                .get_mut(&handle.worker_id)
                .filter(|l| l.generation == handle.generation)
                .ok_or_else(|| WorkerError::NotFound(handle.worker_id.clone()))?;
            // Disconnected and being terminated
            if !live.attached {
                return Err(WorkerError::NotFound(handle.worker_id.clone()));
            }
            if live.current.is_some() {
                return Err(WorkerError::Busy(handle.worker_id.clone()));
            }
            live.current = Some(event.id.clone());
            live.output.install(output);
            live.assign_tx.clone()
        };

        assign_tx.try_send(event).map_err(|e| {
            let worker_id = handle.worker_id.clone();
            match e {
                mpsc::error::TrySendError::Full(_) => WorkerError::Busy(worker_id),
                mpsc::error::TrySendError::Closed(_) => WorkerError::NotFound(worker_id),
            }
        })
    }

    async fn kill(&self, handle: &WorkerHandle) -> Result<(), WorkerError> {
        let Some(mut live) = self.shared.remove(handle) else {
            return Ok(());
        };

        if let Some(commands) = live.commands.take() {
            let (reply_tx, reply_rx) = oneshot::channel();
            if commands.send(WaiterCommand::Kill(reply_tx)).is_ok() {
                // Err means the waiter already saw the exit
                let _ = reply_rx.await;
            }
        }

        // The process is gone; let the pumps flush what it wrote
        for pump in live.pumps.drain(..) {
            let abort = pump.abort_handle();
            if tokio::time::timeout(self.config.drain_timeout, pump)
                .await
                .is_err()
            {
                tracing::warn!(worker_id = %handle.worker_id, "output still open after kill, abandoning");
                abort.abort();
            }
        }
        live.close_output();
        Ok(())
    }
}

/// Copy one pipe into the current execution's sink.
///
/// When an execution is reported, whatever it printed before the report
/// is already buffered in the pipe; that is read into its sinks before
/// they close.
fn pump<R>(mut pipe: R, stream: OutputStream, output: OutputCell, worker_id: WorkerId) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; 8 * 1024];
        loop {
            tokio::select! {
                read = pipe.read(&mut buf) => match read {
                    Ok(0) => break,
                    Ok(n) => output.write(stream, &buf[..n], &worker_id),
                    Err(e) => {
                        tracing::warn!(%worker_id, %stream, error = %e, "output pipe failed");
                        break;
                    }
                },
                () = output.retired_notify(stream).notified() => {
                    while let Ok(Ok(n)) = tokio::time::timeout(Duration::ZERO, pipe.read(&mut buf)).await {
                        if n == 0 {
                            break;
                        }
                        output.write(stream, &buf[..n], &worker_id);
                    }
                    output.close_retired(stream);
                }
            }
        }
        output.close_retired(stream);
    })
}

/// Owns the child; reports exits that nobody asked for.
async fn wait_for_exit(
    mut child: Child,
    mut commands: mpsc::UnboundedReceiver<WaiterCommand>,
    shared: Arc<ProcessShared>,
    worker_id: WorkerId,
    generation: u64,
) {
    loop {
        tokio::select! {
            status = child.wait() => {
                let exit_code = match status {
                    Ok(status) => status.code(),
                    Err(e) => {
                        tracing::warn!(%worker_id, error = %e, "wait failed");
                        None
                    }
                };
                tracing::info!(%worker_id, generation, ?exit_code, "worker exited");
                let msg = WorkerMessage::Exited {
                    worker_id: worker_id.clone(),
                    generation,
                    exit_code,
                };
                shared.forward(&worker_id, generation, msg).await;
                return;
            }
            command = commands.recv() => match command {
                Some(WaiterCommand::Abandon) => {
                    tracing::warn!(%worker_id, generation, "worker disconnected, terminating");
                    let _ = child.start_kill();
                }
                Some(WaiterCommand::Kill(reply)) => {
                    let _ = child.kill().await;
                    let _ = reply.send(());
                    return;
                }
                None => {
                    let _ = child.kill().await;
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
