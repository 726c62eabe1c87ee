//! Runtime configuration.

use crate::metrics::ZeroLatencyPolicy;
use anyhow::{bail, Context, Result};
use kernelmeter_zoo::FetchOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_DATASET_URL: &str =
    "https://github.com/microsoft/nn-Meter/releases/download/v1.0-data/datasets.zip";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    /// Root of the predictor zoo; each hardware lives in `<zoo_root>/<name>`.
    pub zoo_root: PathBuf,

    /// YAML list of hardware profiles.
    pub registry_path: PathBuf,

    pub dataset_url: String,
    pub dataset_dir: PathBuf,

    pub fetch: FetchOptions,

    /// Evaluate hardware profiles concurrently.
    pub parallel: bool,

    /// Keep per-record predictions in evaluation reports.
    pub keep_predictions: bool,

    pub zero_latency_policy: ZeroLatencyPolicy,
}

impl Default for MeterConfig {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            zoo_root: data_dir.join("predictors"),
            registry_path: PathBuf::from("configs/predictors.yaml"),
            dataset_url: DEFAULT_DATASET_URL.to_string(),
            dataset_dir: data_dir.join("dataset"),
            fetch: FetchOptions::default(),
            parallel: false,
            keep_predictions: false,
            zero_latency_policy: ZeroLatencyPolicy::default(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".kernelmeter")
}

impl MeterConfig {
    /// Load from `path` when given, otherwise defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.fetch.chunk_size == 0 {
            bail!("fetch.chunk_size must be positive");
        }
        if self.fetch.timeout_secs == 0 {
            bail!("fetch.timeout_secs must be positive");
        }
        if self.dataset_url.trim().is_empty() {
            bail!("dataset_url must not be empty");
        }
        Ok(())
    }
}
