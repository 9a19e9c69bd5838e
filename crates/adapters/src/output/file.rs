// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only per-event log files.

use super::{LogCollector, OutputKey, OutputStream};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Writes each stream to
/// `<logs>/event/<function_id>/<event_id>.<stream>.log`.
///
/// Files are opened lazily on the first chunk, so an execution that prints
/// nothing leaves no file behind. I/O failures are logged and never
/// propagate into the worker.
pub struct FileLogCollector {
    log_dir: PathBuf,
    open: Mutex<HashMap<(OutputKey, OutputStream), File>>,
}

impl FileLogCollector {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            open: Mutex::new(HashMap::new()),
        }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Where a stream of one execution is written.
    pub fn path_for(&self, key: &OutputKey, stream: OutputStream) -> PathBuf {
        event_output_path(&self.log_dir, key, stream)
    }

    fn open_file(&self, key: &OutputKey, stream: OutputStream) -> std::io::Result<File> {
        let path = self.path_for(key, stream);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(path)
    }
}

pub fn event_output_path(log_dir: &Path, key: &OutputKey, stream: OutputStream) -> PathBuf {
    log_dir
        .join("event")
        .join(key.function_id.as_str())
        .join(format!("{}.{}.log", key.event_id, stream))
}

impl LogCollector for FileLogCollector {
    fn write(&self, key: &OutputKey, stream: OutputStream, chunk: &[u8]) {
        let mut open = self.open.lock();
        let slot = (key.clone(), stream);
        if !open.contains_key(&slot) {
            match self.open_file(key, stream) {
                Ok(file) => {
                    open.insert(slot.clone(), file);
                }
                Err(e) => {
                    tracing::warn!(
                        event_id = %key.event_id,
                        %stream,
                        error = %e,
                        "failed to open output log"
                    );
                    return;
                }
            }
        }
        if let Some(file) = open.get_mut(&slot) {
            if let Err(e) = file.write_all(chunk) {
                tracing::warn!(event_id = %key.event_id, %stream, error = %e, "output write failed");
            }
        }
    }

    fn close(&self, key: &OutputKey, stream: OutputStream) {
        if let Some(mut file) = self.open.lock().remove(&(key.clone(), stream)) {
            let _ = file.flush();
        }
    }
}

#[cfg(test)]
#[path = "file_tests.rs"]
mod tests;
