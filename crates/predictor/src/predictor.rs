//! Kernel-level latency predictor for one hardware profile.

use crate::error::PredictError;
use crate::planner::KernelPlanner;
use kernelmeter_ir::Graph;
use kernelmeter_kernels::KernelModelSet;
use kernelmeter_zoo::LoadedZoo;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Graph format handed to [`KernelLevelPredictor::predict`]. Only graph IR is
/// consumed directly; framework formats go through an external converter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelType {
    #[default]
    GraphIr,
    Onnx,
    Tensorflow,
    Torch,
}

impl ModelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::GraphIr => "graph-ir",
            ModelType::Onnx => "onnx",
            ModelType::Tensorflow => "tensorflow",
            ModelType::Torch => "torch",
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "graph-ir" | "graphir" | "ir" => Ok(ModelType::GraphIr),
            "onnx" => Ok(ModelType::Onnx),
            "tensorflow" | "pb" => Ok(ModelType::Tensorflow),
            "torch" | "pytorch" => Ok(ModelType::Torch),
            other => Err(format!("unknown model type `{other}`")),
        }
    }
}

/// Estimate for one fused kernel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KernelEstimate {
    /// Empty for zero-cost groups.
    pub kernel_type: String,
    /// Model id the kernel type resolved to, if any.
    pub model_id: Option<String>,
    pub nodes: Vec<String>,
    pub latency_ms: f64,
}

#[derive(Debug, Clone)]
pub struct KernelLevelPredictor {
    hardware: String,
    version: String,
    planner: KernelPlanner,
    models: KernelModelSet,
}

impl KernelLevelPredictor {
    pub fn new(
        hardware: impl Into<String>,
        version: impl Into<String>,
        planner: KernelPlanner,
        models: KernelModelSet,
    ) -> Self {
        Self {
            hardware: hardware.into(),
            version: version.into(),
            planner,
            models,
        }
    }

    /// Predictor over a loaded zoo using its rule-based grouping.
    pub fn from_zoo(zoo: &LoadedZoo) -> Result<Self, PredictError> {
        let rules = zoo.fusion_rules()?;
        Ok(Self::new(
            zoo.profile.name.clone(),
            zoo.profile.version.clone(),
            KernelPlanner::rule_based(rules),
            zoo.models.clone(),
        ))
    }

    pub fn hardware(&self) -> &str {
        &self.hardware
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn planner(&self) -> &KernelPlanner {
        &self.planner
    }

    pub fn models(&self) -> &KernelModelSet {
        &self.models
    }

    /// Total latency (ms) of `graph`.
    pub fn predict(&self, graph: &Graph, model_type: ModelType) -> Result<f64, PredictError> {
        if model_type != ModelType::GraphIr {
            return Err(PredictError::UnsupportedModelType { model_type });
        }
        let total = self
            .predict_kernels(graph)?
            .iter()
            .map(|kernel| kernel.latency_ms)
            .sum::<f64>();
        debug!(
            hardware = %self.hardware,
            nodes = graph.len(),
            latency_ms = total,
            "predicted graph latency"
        );
        Ok(total)
    }

    pub fn predict_kernels(&self, graph: &Graph) -> Result<Vec<KernelEstimate>, PredictError> {
        let plan = self.planner.plan(graph)?;
        let mut estimates = Vec::with_capacity(plan.len());
        for kernel in plan {
            let Some(features) = kernel.features else {
                estimates.push(KernelEstimate {
                    kernel_type: String::new(),
                    model_id: None,
                    nodes: kernel.group.nodes,
                    latency_ms: 0.0,
                });
                continue;
            };

            let (model_id, model) = self
                .models
                .resolve(&features.kernel_type)
                .ok_or_else(|| PredictError::UnknownKernelType {
                    kernel_type: features.kernel_type.clone(),
                    hardware: self.hardware.clone(),
                })?;
            let latency_ms = model
                .predict(features.values.view())
                .map_err(|source| PredictError::Model {
                    kernel_id: model_id.to_string(),
                    source,
                })?;
            estimates.push(KernelEstimate {
                model_id: Some(model_id.to_string()),
                kernel_type: features.kernel_type,
                nodes: kernel.group.nodes,
                latency_ms,
            });
        }
        Ok(estimates)
    }

    /// Write each node's share of its kernel latency into
    /// `attr.latency[<hardware>]`; returns the total.
    pub fn annotate(&self, graph: &mut Graph) -> Result<f64, PredictError> {
        let estimates = self.predict_kernels(graph)?;
        let mut total = 0.0;
        for kernel in &estimates {
            let share = kernel.latency_ms / kernel.nodes.len().max(1) as f64;
            for node in &kernel.nodes {
                graph.annotate_latency(node, &self.hardware, share)?;
            }
            total += kernel.latency_ms;
        }
        Ok(total)
    }
}
