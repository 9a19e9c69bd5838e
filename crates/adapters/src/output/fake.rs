// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory collector for tests
#![cfg_attr(coverage_nightly, coverage(off))]

use super::{LogCollector, OutputKey, OutputStream};
use hz_core::EventId;
use parking_lot::Mutex;
use std::sync::Arc;

/// One recorded write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedChunk {
    pub key: OutputKey,
    pub stream: OutputStream,
    pub bytes: Vec<u8>,
}

#[derive(Default)]
struct FakeCollectorState {
    chunks: Vec<CollectedChunk>,
    closed: Vec<(OutputKey, OutputStream)>,
}

/// Records every chunk and close; cloning shares the recording
#[derive(Clone, Default)]
pub struct FakeLogCollector {
    inner: Arc<Mutex<FakeCollectorState>>,
}

impl FakeLogCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunks(&self) -> Vec<CollectedChunk> {
        self.inner.lock().chunks.clone()
    }

    /// Concatenated output of one stream of one event
    pub fn text(&self, event_id: &str, stream: OutputStream) -> String {
        let state = self.inner.lock();
        let bytes: Vec<u8> = state
            .chunks
            .iter()
            .filter(|c| c.key.event_id == *event_id && c.stream == stream)
            .flat_map(|c| c.bytes.iter().copied())
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    pub fn is_closed(&self, event_id: &str, stream: OutputStream) -> bool {
        self.inner
            .lock()
            .closed
            .iter()
            .any(|(k, s)| k.event_id == *event_id && *s == stream)
    }

    pub fn close_count(&self, event_id: &EventId) -> usize {
        self.inner
            .lock()
            .closed
            .iter()
            .filter(|(k, _)| k.event_id == *event_id)
            .count()
    }
}

impl LogCollector for FakeLogCollector {
    fn write(&self, key: &OutputKey, stream: OutputStream, chunk: &[u8]) {
        self.inner.lock().chunks.push(CollectedChunk {
            key: key.clone(),
            stream,
            bytes: chunk.to_vec(),
        });
    }

    fn close(&self, key: &OutputKey, stream: OutputStream) {
        self.inner.lock().closed.push((key.clone(), stream));
    }
}
