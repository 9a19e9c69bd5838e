// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Function definitions read from `<functions_dir>/*.toml`.
//!
//! One file per function:
//!
//! ```toml
//! id = "thumbnails"
//! entrypoint = "/srv/artifacts/thumbnails.js"
//! timeout = "10s"
//!
//! [[triggers]]
//! id = "nightly"
//! kind = "schedule"
//! options = { cron = "0 3 * * *" }
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use hz_core::FunctionDef;
use tracing::{info, warn};

use crate::lifecycle::LifecycleError;

/// A definition file that could not be used
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedDefinition {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct LoadedDefinitions {
    /// Sorted by file name
    pub functions: Vec<FunctionDef>,
    pub skipped: Vec<SkippedDefinition>,
}

pub fn parse_definition(text: &str) -> Result<FunctionDef, String> {
    toml::from_str(text).map_err(|e| e.to_string())
}

/// Read every `*.toml` file in `dir`.
///
/// A missing directory means no functions. Unreadable or invalid files and
/// duplicate ids are skipped with a warning; only failing to list the
/// directory is an error.
pub fn load_functions(dir: &Path) -> Result<LoadedDefinitions, LifecycleError> {
    let mut loaded = LoadedDefinitions::default();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(dir = %dir.display(), "no functions directory");
            return Ok(loaded);
        }
        Err(e) => return Err(LifecycleError::Definitions(dir.to_path_buf(), e)),
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    paths.sort();

    let mut seen = HashSet::new();
    for path in paths {
        let parsed = std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|text| parse_definition(&text));
        let reason = match parsed {
            Ok(function) if seen.insert(function.id.clone()) => {
                loaded.functions.push(function);
                continue;
            }
            Ok(function) => format!("duplicate function id {}", function.id),
            Err(reason) => reason,
        };
        warn!(path = %path.display(), reason = %reason, "skipping function definition");
        loaded.skipped.push(SkippedDefinition { path, reason });
    }

    info!(
        dir = %dir.display(),
        loaded = loaded.functions.len(),
        skipped = loaded.skipped.len(),
        "loaded function definitions"
    );
    Ok(loaded)
}

#[cfg(test)]
#[path = "definitions_tests.rs"]
mod tests;
