// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host side of the worker socket.
//!
//! Each runtime process holds one connection for its whole life. The
//! listener authenticates it against the token handed out at spawn, feeds
//! it assignments on `Pop`, and turns its reports into [`WorkerMessage`]s.

use super::process::{ProcessShared, Session};
use super::WorkerMessage;
use crate::protocol::{
    decode, read_message, read_request, write_response, ProtocolError, Request, Response,
    DEFAULT_TIMEOUT,
};
use hz_core::{EventId, WorkerId};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Accept loop for worker connections. Dropping it stops accepting and
/// removes the socket file.
pub struct WorkerListener {
    path: PathBuf,
    task: JoinHandle<()>,
}

impl WorkerListener {
    pub(super) fn bind(path: &Path, shared: Arc<ProcessShared>) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // A stale socket from a previous run would make bind fail
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        let socket = UnixListener::bind(path)?;
        let task = tokio::spawn(accept_loop(socket, shared));
        Ok(Self {
            path: path.to_path_buf(),
            task,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkerListener {
    fn drop(&mut self) {
        self.task.abort();
        let _ = std::fs::remove_file(&self.path);
    }
}

async fn accept_loop(socket: UnixListener, shared: Arc<ProcessShared>) {
    loop {
        match socket.accept().await {
            Ok((stream, _)) => {
                let shared = Arc::clone(&shared);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(shared, stream).await {
                        match e {
                            ProtocolError::ConnectionClosed => debug!("worker disconnected"),
                            ProtocolError::Timeout => warn!("worker connection timeout"),
                            _ => error!("worker connection error: {}", e),
                        }
                    }
                });
            }
            Err(e) => error!("accept error: {}", e),
        }
    }
}

async fn handle_connection(shared: Arc<ProcessShared>, stream: UnixStream) -> Result<(), ProtocolError> {
    let (mut reader, mut writer) = stream.into_split();

    let (worker_id, token) = match read_request(&mut reader, Some(DEFAULT_TIMEOUT)).await? {
        Request::Hello { worker_id, token } => (worker_id, token),
        other => {
            let response = Response::error("expected Hello");
            write_response(&mut writer, &response, DEFAULT_TIMEOUT).await?;
            return Err(ProtocolError::Unexpected(format!("{other:?}")));
        }
    };

    let mut session = match shared.attach(&worker_id, &token) {
        Ok(session) => session,
        Err(message) => {
            warn!(%worker_id, %message, "rejected worker");
            write_response(&mut writer, &Response::error(message.clone()), DEFAULT_TIMEOUT).await?;
            return Err(ProtocolError::Rejected(message));
        }
    };

    let welcome = Response::Welcome {
        worker_id: session.worker_id.clone(),
        generation: session.generation,
    };
    write_response(&mut writer, &welcome, DEFAULT_TIMEOUT).await?;
    tracing::info!(%worker_id, generation = session.generation, "worker attached");
    shared
        .forward(
            &session.worker_id,
            session.generation,
            WorkerMessage::Ready {
                worker_id: session.worker_id.clone(),
                generation: session.generation,
            },
        )
        .await;

    let result = serve(&shared, &mut session, &mut reader, &mut writer).await;

    if let Some(event_id) = shared.detach(&session) {
        warn!(%worker_id, %event_id, "worker disconnected with an assignment");
        let msg = WorkerMessage::Nacked {
            worker_id: session.worker_id.clone(),
            generation: session.generation,
            event_id,
            reason: "worker disconnected".to_string(),
        };
        shared.forward(&session.worker_id, session.generation, msg).await;
    }
    result
}

async fn serve(
    shared: &ProcessShared,
    session: &mut Session,
    reader: &mut OwnedReadHalf,
    writer: &mut OwnedWriteHalf,
) -> Result<(), ProtocolError> {
    let worker_id: WorkerId = session.worker_id.clone();
    let generation = session.generation;

    loop {
        let request: Request = match read_message(&mut *reader).await {
            Ok(bytes) => decode(&bytes)?,
            Err(ProtocolError::ConnectionClosed) => return Ok(()),
            Err(e) => return Err(e),
        };

        let response = match request {
            Request::Pop => {
                // Watch the connection while waiting so a worker that dies
                // idle is noticed before anything is assigned to it
                let event = tokio::select! {
                    event = session.assign_rx.recv() => match event {
                        Some(event) => event,
                        None => return Ok(()),
                    },
                    early = read_message(&mut *reader) => {
                        return match early {
                            Err(ProtocolError::ConnectionClosed) => Ok(()),
                            Err(e) => Err(e),
                            Ok(_) => Err(ProtocolError::Unexpected("request while Pop is pending".into())),
                        };
                    }
                };
                if !shared.claim(session, &event.id) {
                    // Killed between assignment and claim
                    return Ok(());
                }
                let event_id = event.id.clone();
                write_response(&mut *writer, &Response::Event { event: Box::new(event) }, DEFAULT_TIMEOUT).await?;
                let msg = WorkerMessage::Claimed {
                    worker_id: worker_id.clone(),
                    generation,
                    event_id,
                };
                shared.forward(&worker_id, generation, msg).await;
                continue;
            }
            Request::Ack { event_id, result } => {
                report(shared, session, &event_id, |event_id| WorkerMessage::Completed {
                    worker_id: worker_id.clone(),
                    generation,
                    event_id,
                    output: result,
                })
                .await
            }
            Request::Fail { event_id, error } => {
                report(shared, session, &event_id, |event_id| WorkerMessage::Failed {
                    worker_id: worker_id.clone(),
                    generation,
                    event_id,
                    error,
                })
                .await
            }
            Request::Nack { event_id, reason } => {
                report(shared, session, &event_id, |event_id| WorkerMessage::Nacked {
                    worker_id: worker_id.clone(),
                    generation,
                    event_id,
                    reason,
                })
                .await
            }
            Request::Hello { .. } => Response::error("already attached"),
        };
        write_response(&mut *writer, &response, DEFAULT_TIMEOUT).await?;
    }
}

/// Close out the worker's assignment and forward the report.
async fn report(
    shared: &ProcessShared,
    session: &Session,
    event_id: &EventId,
    msg: impl FnOnce(EventId) -> WorkerMessage,
) -> Response {
    if !shared.finish(session, event_id) {
        return Response::error(format!("{event_id} is not assigned to {}", session.worker_id));
    }
    shared
        .forward(&session.worker_id, session.generation, msg(event_id.clone()))
        .await;
    Response::Ok
}
