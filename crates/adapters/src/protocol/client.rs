// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime-side connection to the host's worker socket.

use super::wire::{read_response, write_request, ProtocolError, DEFAULT_TIMEOUT};
use super::{Request, Response};
use hz_core::{Event, EventId, WorkerId};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;

/// Path of the host's worker socket
pub const ENV_SOCKET: &str = "HORIZON_SOCKET";
/// Slot identity of the spawned process
pub const ENV_WORKER_ID: &str = "HORIZON_WORKER_ID";
/// One-time secret proving the process was spawned by the host
pub const ENV_WORKER_TOKEN: &str = "HORIZON_WORKER_TOKEN";

/// Worker side of the protocol.
///
/// Runtimes that are not written in Rust speak the same framing; this client
/// exists for Rust runtimes and tests.
pub struct WorkerClient {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    worker_id: WorkerId,
    generation: u64,
    timeout: Duration,
}

impl WorkerClient {
    /// Connect and complete the `Hello` handshake.
    pub async fn connect(
        socket: &Path,
        worker_id: WorkerId,
        token: &str,
    ) -> Result<Self, ProtocolError> {
        let stream = tokio::time::timeout(DEFAULT_TIMEOUT, UnixStream::connect(socket))
            .await
            .map_err(|_| ProtocolError::Timeout)??;
        let (reader, writer) = stream.into_split();
        let mut client = Self {
            reader,
            writer,
            worker_id: worker_id.clone(),
            generation: 0,
            timeout: DEFAULT_TIMEOUT,
        };

        let hello = Request::Hello {
            worker_id,
            token: token.to_string(),
        };
        match client.call(&hello, Some(DEFAULT_TIMEOUT)).await? {
            Response::Welcome { generation, .. } => {
                client.generation = generation;
                Ok(client)
            }
            other => Err(unexpected(other)),
        }
    }

    /// Connect using the variables the host sets on spawned processes.
    pub async fn from_env() -> Result<Self, ProtocolError> {
        let socket = env_var(ENV_SOCKET)?;
        let worker_id = env_var(ENV_WORKER_ID)?;
        let token = env_var(ENV_WORKER_TOKEN)?;
        Self::connect(&PathBuf::from(socket), WorkerId::new(worker_id), &token).await
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn worker_id(&self) -> &WorkerId {
        &self.worker_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Wait for the next assignment. No deadline: a worker may sit idle for
    /// as long as the queue is empty.
    pub async fn pop(&mut self) -> Result<Event, ProtocolError> {
        self.pop_within(None).await
    }

    /// Wait for the next assignment, giving up after `limit`.
    pub async fn pop_within(&mut self, limit: Option<Duration>) -> Result<Event, ProtocolError> {
        match self.call(&Request::Pop, limit).await? {
            Response::Event { event } => Ok(*event),
            other => Err(unexpected(other)),
        }
    }

    pub async fn ack(
        &mut self,
        event_id: &EventId,
        result: serde_json::Value,
    ) -> Result<(), ProtocolError> {
        let request = Request::Ack {
            event_id: event_id.clone(),
            result,
        };
        self.expect_ok(&request).await
    }

    pub async fn nack(&mut self, event_id: &EventId, reason: &str) -> Result<(), ProtocolError> {
        let request = Request::Nack {
            event_id: event_id.clone(),
            reason: reason.to_string(),
        };
        self.expect_ok(&request).await
    }

    pub async fn fail(&mut self, event_id: &EventId, error: &str) -> Result<(), ProtocolError> {
        let request = Request::Fail {
            event_id: event_id.clone(),
            error: error.to_string(),
        };
        self.expect_ok(&request).await
    }

    async fn expect_ok(&mut self, request: &Request) -> Result<(), ProtocolError> {
        match self.call(request, Some(self.timeout)).await? {
            Response::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn call(
        &mut self,
        request: &Request,
        timeout: Option<Duration>,
    ) -> Result<Response, ProtocolError> {
        write_request(&mut self.writer, request, self.timeout).await?;
        match read_response(&mut self.reader, timeout).await? {
            Response::Error { message } => Err(ProtocolError::Rejected(message)),
            response => Ok(response),
        }
    }
}

fn env_var(name: &str) -> Result<String, ProtocolError> {
    std::env::var(name).map_err(|_| ProtocolError::Unexpected(format!("{name} is not set")))
}

fn unexpected(response: Response) -> ProtocolError {
    ProtocolError::Unexpected(format!("{response:?}"))
}
