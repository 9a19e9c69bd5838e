// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::output::OutputCapture;
use hz_core::{EventId, FunctionId};
use tempfile::TempDir;

#[test]
fn writes_streams_to_separate_files() {
    let dir = TempDir::new().unwrap();
    let collector = FileLogCollector::new(dir.path());
    let key = OutputKey::new("evt-1", "thumbs");
    let stdout_path = collector.path_for(&key, OutputStream::Stdout);
    let stderr_path = collector.path_for(&key, OutputStream::Stderr);

    let capture = OutputCapture::new(collector);
    let mut pair = capture.open(&EventId::new("evt-1"), &FunctionId::new("thumbs"));
    pair.stdout.write(b"hello ").unwrap();
    pair.stderr.write(b"oops\n").unwrap();
    pair.stdout.write(b"world\n").unwrap();
    pair.close();

    assert_eq!(
        stdout_path,
        dir.path().join("event/thumbs/evt-1.stdout.log")
    );
    assert_eq!(std::fs::read_to_string(stdout_path).unwrap(), "hello world\n");
    assert_eq!(std::fs::read_to_string(stderr_path).unwrap(), "oops\n");
}

#[test]
fn silent_execution_leaves_no_file() {
    let dir = TempDir::new().unwrap();
    let collector = FileLogCollector::new(dir.path());
    let key = OutputKey::new("evt-2", "thumbs");
    let path = collector.path_for(&key, OutputStream::Stdout);

    let capture = OutputCapture::new(collector);
    drop(capture.open(&EventId::new("evt-2"), &FunctionId::new("thumbs")));

    assert!(!path.exists());
}

#[test]
fn appends_across_reopen() {
    let dir = TempDir::new().unwrap();
    let collector = FileLogCollector::new(dir.path());
    let key = OutputKey::new("evt-3", "f");

    collector.write(&key, OutputStream::Stdout, b"a");
    collector.close(&key, OutputStream::Stdout);
    collector.write(&key, OutputStream::Stdout, b"b");
    collector.close(&key, OutputStream::Stdout);

    let path = collector.path_for(&key, OutputStream::Stdout);
    assert_eq!(std::fs::read_to_string(path).unwrap(), "ab");
}
