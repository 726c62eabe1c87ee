//! Artifact retrieval: stream a remote archive to disk and unpack it.

use crate::error::{Result, ZooError};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Name of the transient archive written under the destination directory.
/// A failed transfer leaves it behind; the next fetch overwrites it.
pub const TRANSIENT_ARCHIVE: &str = ".download.zip";

pub trait ArtifactFetcher: Send + Sync {
    /// Download `url` and extract it into `dest_dir`, creating the directory.
    fn fetch(&self, url: &str, dest_dir: &Path) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchOptions {
    pub timeout_secs: u64,
    pub chunk_size: usize,
    pub show_progress: bool,
    pub user_agent: String,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            chunk_size: 2048,
            show_progress: true,
            user_agent: concat!("kernelmeter/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

pub struct HttpFetcher {
    client: reqwest::blocking::Client,
    options: FetchOptions,
}

impl HttpFetcher {
    pub fn new(options: FetchOptions) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(options.user_agent.clone())
            .timeout(Duration::from_secs(options.timeout_secs))
            .build()
            .map_err(|err| ZooError::transport("<client>", err))?;
        Ok(Self { client, options })
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    fn progress_bar(&self, total_bytes: Option<u64>) -> ProgressBar {
        if !self.options.show_progress {
            return ProgressBar::hidden();
        }
        let bar = match total_bytes {
            Some(total) => ProgressBar::new(total),
            None => ProgressBar::new_spinner(),
        };
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})",
        ) {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar
    }
}

impl ArtifactFetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest_dir: &Path) -> Result<()> {
        fs::create_dir_all(dest_dir).map_err(|err| ZooError::io(dest_dir, err))?;
        let archive_path = dest_dir.join(TRANSIENT_ARCHIVE);

        info!(url, dest = %dest_dir.display(), "downloading artifact");
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|err| ZooError::transport(url, err))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ZooError::transport(url, format!("HTTP status {status}")));
        }

        let progress = self.progress_bar(response.content_length());
        let file = File::create(&archive_path).map_err(|err| ZooError::io(&archive_path, err))?;
        let mut writer = BufWriter::new(file);
        let mut chunk = vec![0u8; self.options.chunk_size.max(1)];
        let mut received = 0u64;
        loop {
            let read = response
                .read(&mut chunk)
                .map_err(|err| ZooError::transport(url, err))?;
            if read == 0 {
                break;
            }
            writer
                .write_all(&chunk[..read])
                .map_err(|err| ZooError::io(&archive_path, err))?;
            received += read as u64;
            progress.inc(read as u64);
        }
        writer
            .flush()
            .map_err(|err| ZooError::io(&archive_path, err))?;
        drop(writer);
        progress.finish_and_clear();
        debug!(url, bytes = received, "download complete");

        extract_archive(&archive_path, dest_dir)?;
        fs::remove_file(&archive_path).map_err(|err| ZooError::io(&archive_path, err))?;
        info!(url, dest = %dest_dir.display(), "artifact extracted");
        Ok(())
    }
}

/// Unpack a zip archive into `dest_dir`.
pub fn extract_archive(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let file = File::open(archive_path).map_err(|err| ZooError::io(archive_path, err))?;
    let archive_err = |source| ZooError::Archive {
        path: archive_path.to_path_buf(),
        source,
    };
    let mut archive = zip::ZipArchive::new(file).map_err(archive_err)?;
    archive.extract(dest_dir).map_err(archive_err)?;
    Ok(())
}
