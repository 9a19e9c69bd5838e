// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Path builders for per-function activity logs.
//!
//! Captured output lives beside these, under `<logs_dir>/event/`.

use std::path::{Path, PathBuf};

/// Structure: `{logs_dir}/function/{function_id}.log`
pub fn function_log_path(logs_dir: &Path, function_id: &str) -> PathBuf {
    logs_dir.join("function").join(format!("{}.log", function_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_logs_live_under_function_dir() {
        assert_eq!(
            function_log_path(Path::new("/state/logs"), "thumbs"),
            PathBuf::from("/state/logs/function/thumbs.log")
        );
    }
}
