// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire format: 4-byte length prefix (big-endian) + JSON payload

use super::{Request, Response};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("connection closed")]
    ConnectionClosed,

    #[error("timeout")]
    Timeout,

    #[error("unexpected message: {0}")]
    Unexpected(String),

    #[error("rejected by host: {0}")]
    Rejected(String),
}

/// Largest accepted frame (16 MiB); event payloads are capped well below
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Deadline for control calls (handshake, ack, nack, fail)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, ProtocolError> {
    let json = serde_json::to_vec(msg)?;
    if json.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: json.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(json)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Read one length-prefixed frame.
///
/// A clean EOF before the prefix is reported as
/// [`ProtocolError::ConnectionClosed`].
pub async fn read_message<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Vec<u8>, ProtocolError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::ConnectionClosed);
        }
        Err(e) => return Err(ProtocolError::Io(e)),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

pub async fn write_message<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    data: &[u8],
) -> Result<(), ProtocolError> {
    let len = data.len();
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }
    writer.write_all(&(len as u32).to_be_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

async fn with_deadline<T>(
    timeout: Option<Duration>,
    fut: impl std::future::Future<Output = Result<T, ProtocolError>>,
) -> Result<T, ProtocolError> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| ProtocolError::Timeout)?,
        None => fut.await,
    }
}

/// Read a request; `None` waits indefinitely.
pub async fn read_request<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    timeout: Option<Duration>,
) -> Result<Request, ProtocolError> {
    let bytes = with_deadline(timeout, read_message(reader)).await?;
    decode(&bytes)
}

pub async fn write_request<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    request: &Request,
    timeout: Duration,
) -> Result<(), ProtocolError> {
    let data = encode(request)?;
    with_deadline(Some(timeout), write_message(writer, &data)).await
}

/// Read a response; `None` waits indefinitely.
pub async fn read_response<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    timeout: Option<Duration>,
) -> Result<Response, ProtocolError> {
    let bytes = with_deadline(timeout, read_message(reader)).await?;
    decode(&bytes)
}

pub async fn write_response<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    response: &Response,
    timeout: Duration,
) -> Result<(), ProtocolError> {
    let data = encode(response)?;
    with_deadline(Some(timeout), write_message(writer, &data)).await
}
