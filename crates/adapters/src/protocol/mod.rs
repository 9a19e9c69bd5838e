// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker protocol: what a runtime process and the host say to each other
//! over the worker socket.
//!
//! The runtime connects, introduces itself with `Hello`, then loops
//! `Pop` → execute → `Ack`/`Fail`/`Nack`.

mod client;
mod wire;

pub use client::{WorkerClient, ENV_SOCKET, ENV_WORKER_ID, ENV_WORKER_TOKEN};
pub use wire::{
    decode, encode, read_message, read_request, read_response, write_message, write_request,
    write_response, ProtocolError, DEFAULT_TIMEOUT, MAX_MESSAGE_SIZE,
};

use hz_core::{Event, EventId, WorkerId};
use serde::{Deserialize, Serialize};

/// Runtime → host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// First message on every connection
    Hello { worker_id: WorkerId, token: String },
    /// Block until the host assigns an event
    Pop,
    /// The function returned normally
    Ack {
        event_id: EventId,
        #[serde(default)]
        result: serde_json::Value,
    },
    /// The runtime refuses the event; the host requeues it once
    Nack { event_id: EventId, reason: String },
    /// The function threw or the runtime could not run it
    Fail { event_id: EventId, error: String },
}

/// Host → runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    Welcome { worker_id: WorkerId, generation: u64 },
    Event { event: Box<Event> },
    Ok,
    Error { message: String },
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
#[path = "../protocol_tests.rs"]
mod tests;
