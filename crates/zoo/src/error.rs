//! Error type for predictor zoo operations.

use kernelmeter_ir::FusionRuleError;
use kernelmeter_kernels::ModelError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ZooError>;

#[derive(Debug, Error)]
pub enum ZooError {
    /// Network or transfer failure. Never retried internally.
    #[error("transfer from {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("fusion rule for {hardware} not found at {}", .path.display())]
    MissingFusionRule { hardware: String, path: PathBuf },

    /// Required kernel predictors still absent after a fetch, typically
    /// because the archive ships models in a format this loader cannot read.
    #[error("predictor zoo for {hardware} is incomplete after fetching, missing: {}", .missing.join(", "))]
    IncompleteZoo {
        hardware: String,
        missing: Vec<String>,
    },

    #[error(transparent)]
    FusionRule(#[from] FusionRuleError),

    #[error("failed to extract archive {}: {source}", .path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("failed to load kernel model `{kernel_id}`: {source}")]
    Model {
        kernel_id: String,
        #[source]
        source: ModelError,
    },

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid hardware registry: {0}")]
    Registry(String),

    #[error("no hardware profile named `{name}`{}", .version.as_deref().map(|v| format!(" with version {v}")).unwrap_or_default())]
    UnknownHardware {
        name: String,
        version: Option<String>,
    },
}

impl ZooError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ZooError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn transport(url: &str, reason: impl ToString) -> Self {
        ZooError::Transport {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}
