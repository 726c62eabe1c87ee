//! Completeness check for on-disk predictor caches.

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct CacheValidator {
    extension: String,
}

impl CacheValidator {
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
        }
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// True when `dir` exists and holds a model file for every required id.
    /// Unreadable directories count as incomplete.
    pub fn is_complete(&self, dir: &Path, required_ids: &[String]) -> bool {
        dir.is_dir() && self.missing_ids(dir, required_ids).is_empty()
    }

    /// Required ids without a model file under `dir`, in request order.
    /// Every id is missing when `dir` cannot be read.
    pub fn missing_ids(&self, dir: &Path, required_ids: &[String]) -> Vec<String> {
        let found = scan_model_files(dir, &self.extension).unwrap_or_default();
        required_ids
            .iter()
            .filter(|id| {
                found
                    .binary_search_by(|(have, _)| have.as_str().cmp(id.as_str()))
                    .is_err()
            })
            .cloned()
            .collect()
    }
}

/// `(id, path)` pairs for every `<id>.<extension>` file directly under `dir`,
/// sorted by id.
pub fn scan_model_files(dir: &Path, extension: &str) -> io::Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() || path.extension() != Some(OsStr::new(extension)) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(OsStr::to_str) {
            files.push((stem.to_string(), path));
        }
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}
