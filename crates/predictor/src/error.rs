use crate::predictor::ModelType;
use kernelmeter_ir::GraphError;
use kernelmeter_kernels::ModelError;
use kernelmeter_zoo::ZooError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PredictError {
    #[error("no kernel predictor for `{kernel_type}` on {hardware}")]
    UnknownKernelType {
        kernel_type: String,
        hardware: String,
    },

    #[error("{model_type} graphs must be converted to graph IR before prediction")]
    UnsupportedModelType { model_type: ModelType },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("kernel predictor `{kernel_id}` failed: {source}")]
    Model {
        kernel_id: String,
        #[source]
        source: ModelError,
    },

    #[error(transparent)]
    Zoo(#[from] ZooError),
}
