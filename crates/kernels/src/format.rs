//! Model file formats.

use crate::model::{DynRegressionModel, ModelDefinition, ModelError};
use std::fs;
use std::path::Path;
use tracing::debug;

pub const MODEL_EXTENSION: &str = "model";

/// Adapter between a serialized model file and a regression backend.
pub trait ModelFormat: Send + Sync {
    /// File extension (without the dot) that identifies model files.
    fn extension(&self) -> &str;
    fn load(&self, path: &Path) -> Result<DynRegressionModel, ModelError>;
}

/// JSON-encoded [`ModelDefinition`] stored as `<kernelId>.model`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonModelFormat;

impl JsonModelFormat {
    pub fn save(definition: &ModelDefinition, path: &Path) -> Result<(), ModelError> {
        let io_err = |source| ModelError::Io {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let blob = serde_json::to_vec_pretty(definition).map_err(|source| ModelError::Decode {
            path: path.display().to_string(),
            source,
        })?;
        fs::write(path, blob).map_err(io_err)
    }
}

impl ModelFormat for JsonModelFormat {
    fn extension(&self) -> &str {
        MODEL_EXTENSION
    }

    fn load(&self, path: &Path) -> Result<DynRegressionModel, ModelError> {
        let data = fs::read(path).map_err(|source| ModelError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let definition: ModelDefinition =
            serde_json::from_slice(&data).map_err(|source| ModelError::Decode {
                path: path.display().to_string(),
                source,
            })?;
        let model = definition.into_model();
        debug!(path = %path.display(), kind = model.kind(), "loaded kernel model");
        Ok(model)
    }
}
