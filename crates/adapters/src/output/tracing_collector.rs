// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{LogCollector, OutputKey, OutputStream};

/// Forwards function output into the host's tracing subscriber.
///
/// Useful when running in the foreground; each chunk becomes one debug
/// record (stderr at info) tagged with the event and function.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogCollector;

impl LogCollector for TracingLogCollector {
    fn write(&self, key: &OutputKey, stream: OutputStream, chunk: &[u8]) {
        let text = String::from_utf8_lossy(chunk);
        let text = text.trim_end_matches('\n');
        match stream {
            OutputStream::Stdout => tracing::debug!(
                target: "horizon::output",
                event_id = %key.event_id,
                function_id = %key.function_id,
                "{text}"
            ),
            OutputStream::Stderr => tracing::info!(
                target: "horizon::output",
                event_id = %key.event_id,
                function_id = %key.function_id,
                stream = "stderr",
                "{text}"
            ),
        }
    }

    fn close(&self, _key: &OutputKey, _stream: OutputStream) {}
}
