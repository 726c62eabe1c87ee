//! Kernel regression backends.
//!
//! Every backend implements [`KernelRegressionModel`]; the predictor only sees
//! the trait object, so new backends can be added without touching it.

use ndarray::{ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model expects {expected} features, got {actual}")]
    FeatureCount { expected: usize, actual: usize },
    #[error("tree node {node} reads feature {feature} but only {len} features were supplied")]
    FeatureIndex {
        node: usize,
        feature: usize,
        len: usize,
    },
    #[error("malformed model: {0}")]
    Malformed(String),
    #[error("model produced a non-finite estimate")]
    NonFinite,
    #[error("failed to read model file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode model file {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

pub trait KernelRegressionModel: Send + Sync {
    fn kind(&self) -> &'static str;
    fn predict(&self, features: ArrayView1<'_, f64>) -> Result<f64, ModelError>;
}

pub type DynRegressionModel = Arc<dyn KernelRegressionModel>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub weights: Vec<f64>,
    #[serde(default)]
    pub intercept: f64,
}

impl LinearModel {
    pub fn new(weights: Vec<f64>, intercept: f64) -> Self {
        Self { weights, intercept }
    }
}

impl KernelRegressionModel for LinearModel {
    fn kind(&self) -> &'static str {
        "linear"
    }

    fn predict(&self, features: ArrayView1<'_, f64>) -> Result<f64, ModelError> {
        if features.len_of(Axis(0)) != self.weights.len() {
            return Err(ModelError::FeatureCount {
                expected: self.weights.len(),
                actual: features.len(),
            });
        }
        let weights = ArrayView1::from(self.weights.as_slice());
        finite(weights.dot(&features) + self.intercept)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Leaf {
        leaf: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Binary regression tree stored as a flat node array rooted at index 0.
/// A split sends `x[feature] <= threshold` to `left`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    pub fn new(nodes: Vec<TreeNode>) -> Self {
        Self { nodes }
    }

    fn evaluate(&self, features: ArrayView1<'_, f64>) -> Result<f64, ModelError> {
        let mut idx = 0;
        // A well-formed tree visits each node at most once on a root-to-leaf path.
        for _ in 0..self.nodes.len() {
            let node = self
                .nodes
                .get(idx)
                .ok_or_else(|| ModelError::Malformed(format!("tree node {idx} does not exist")))?;
            match node {
                TreeNode::Leaf { leaf } => return Ok(*leaf),
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let value = features.get(*feature).ok_or(ModelError::FeatureIndex {
                        node: idx,
                        feature: *feature,
                        len: features.len(),
                    })?;
                    idx = if *value <= *threshold { *left } else { *right };
                }
            }
        }
        Err(ModelError::Malformed(
            "decision path does not terminate in a leaf".into(),
        ))
    }
}

impl KernelRegressionModel for DecisionTree {
    fn kind(&self) -> &'static str {
        "decision_tree"
    }

    fn predict(&self, features: ArrayView1<'_, f64>) -> Result<f64, ModelError> {
        finite(self.evaluate(features)?)
    }
}

/// Mean of the member trees' estimates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    pub trees: Vec<DecisionTree>,
}

impl RandomForest {
    pub fn new(trees: Vec<DecisionTree>) -> Self {
        Self { trees }
    }
}

impl KernelRegressionModel for RandomForest {
    fn kind(&self) -> &'static str {
        "random_forest"
    }

    fn predict(&self, features: ArrayView1<'_, f64>) -> Result<f64, ModelError> {
        if self.trees.is_empty() {
            return Err(ModelError::Malformed("random forest has no trees".into()));
        }
        let total = self
            .trees
            .iter()
            .map(|tree| tree.evaluate(features))
            .sum::<Result<f64, ModelError>>()?;
        finite(total / self.trees.len() as f64)
    }
}

/// On-disk model description, tagged by backend kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelDefinition {
    Linear(LinearModel),
    DecisionTree(DecisionTree),
    RandomForest(RandomForest),
}

impl ModelDefinition {
    pub fn into_model(self) -> DynRegressionModel {
        match self {
            ModelDefinition::Linear(model) => Arc::new(model),
            ModelDefinition::DecisionTree(model) => Arc::new(model),
            ModelDefinition::RandomForest(model) => Arc::new(model),
        }
    }
}

fn finite(value: f64) -> Result<f64, ModelError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ModelError::NonFinite)
    }
}
