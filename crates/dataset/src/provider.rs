//! Benchmark dataset provider.

use crate::error::{DatasetError, Result};
use kernelmeter_zoo::{ArtifactFetcher, DirectoryLocks};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use walkdir::WalkDir;

pub const DATASET_EXTENSION: &str = "jsonl";

pub struct DatasetProvider {
    fetcher: Arc<dyn ArtifactFetcher>,
    locks: Arc<DirectoryLocks>,
}

impl DatasetProvider {
    pub fn new(fetcher: Arc<dyn ArtifactFetcher>) -> Self {
        Self::with_locks(fetcher, Arc::new(DirectoryLocks::new()))
    }

    /// Provider whose fetches are serialised through an existing lock table.
    pub fn with_locks(fetcher: Arc<dyn ArtifactFetcher>, locks: Arc<DirectoryLocks>) -> Self {
        Self { fetcher, locks }
    }

    /// Make sure the dataset is present under `local_dir` and list its files.
    ///
    /// The archive is fetched when `local_dir` holds no dataset file yet, so an
    /// interrupted download is retried on the next call.
    pub fn ensure(&self, url: &str, local_dir: &Path) -> Result<Vec<PathBuf>> {
        let lock = self.locks.entry(local_dir);
        let _guard = lock.lock();

        fs::create_dir_all(local_dir).map_err(|err| DatasetError::io(local_dir, err))?;
        let mut files = list_dataset_files(local_dir)?;
        if files.is_empty() {
            info!(url, dir = %local_dir.display(), "downloading benchmark dataset");
            self.fetcher.fetch(url, local_dir)?;
            files = list_dataset_files(local_dir)?;
        }
        info!(dir = %local_dir.display(), files = files.len(), "benchmark dataset ready");
        Ok(files)
    }
}

/// Every `*.jsonl` file below `dir`, sorted by path.
pub fn list_dataset_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file()
            && entry.path().extension() == Some(OsStr::new(DATASET_EXTENSION))
        {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}
