//! Kernel fusion: partitioning a graph into latency-prediction units.

use crate::graph::{Graph, GraphError};
use crate::ops::{canonical_op, is_zero_cost};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum FusionRuleError {
    #[error("failed to read fusion rule {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed fusion rule document: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FusionRule {
    #[serde(default)]
    pub obey: bool,
}

/// Per-hardware pairwise fusion decisions keyed by `"<opA>_<opB>"`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FusionRuleDocument {
    rules: BTreeMap<String, FusionRule>,
}

impl FusionRuleDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, FusionRuleError> {
        let blob = fs::read_to_string(path).map_err(|source| FusionRuleError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&blob)
    }

    pub fn from_json_str(json: &str) -> Result<Self, FusionRuleError> {
        let raw: BTreeMap<String, FusionRule> = serde_json::from_str(json)?;
        Ok(raw
            .into_iter()
            .fold(Self::new(), |doc, (key, rule)| doc.with_rule(&key, rule.obey)))
    }

    pub fn with_rule(mut self, key: &str, obey: bool) -> Self {
        self.rules
            .insert(key.to_ascii_lowercase(), FusionRule { obey });
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Whether an `upstream` operator directly feeding `downstream` fuses.
    pub fn can_fuse(&self, upstream: &str, downstream: &str) -> bool {
        let key = format!("{}_{}", canonical_op(upstream), canonical_op(downstream));
        self.rules.get(&key).map(|rule| rule.obey).unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelGroup {
    pub nodes: Vec<String>,
}

impl KernelGroup {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

pub trait FusionGrouper: Send + Sync {
    fn name(&self) -> &str;
    fn group(&self, graph: &Graph) -> Result<Vec<KernelGroup>, GraphError>;
}

/// Chains adjacent operators whenever the fusion rule document allows it.
pub struct RuleBasedGrouper {
    rules: FusionRuleDocument,
}

impl RuleBasedGrouper {
    pub fn new(rules: FusionRuleDocument) -> Self {
        Self { rules }
    }
}

impl FusionGrouper for RuleBasedGrouper {
    fn name(&self) -> &str {
        "rule-based"
    }

    fn group(&self, graph: &Graph) -> Result<Vec<KernelGroup>, GraphError> {
        let order = graph.topological_order()?;
        let successors = graph.successor_map();
        let mut groups: Vec<KernelGroup> = Vec::new();
        let mut group_of: HashMap<&str, usize> = HashMap::with_capacity(order.len());

        for name in order {
            let node = graph
                .get(name)
                .ok_or_else(|| GraphError::UnknownNode(name.to_string()))?;
            let preds = graph.predecessors(name);

            let target = match preds.as_slice() {
                [pred] => {
                    let pred_node = graph
                        .get(pred)
                        .ok_or_else(|| GraphError::UnknownNode(pred.to_string()))?;
                    let idx = group_of[pred];
                    let is_tail = groups[idx].nodes.last().map(String::as_str) == Some(*pred);
                    let fusable = is_tail
                        && successors[pred].len() == 1
                        && !is_zero_cost(pred_node.op_type())
                        && !is_zero_cost(node.op_type())
                        && self.rules.can_fuse(pred_node.op_type(), node.op_type());
                    fusable.then_some(idx)
                }
                _ => None,
            };

            let idx = match target {
                Some(idx) => {
                    groups[idx].nodes.push(name.to_string());
                    idx
                }
                None => {
                    groups.push(KernelGroup {
                        nodes: vec![name.to_string()],
                    });
                    groups.len() - 1
                }
            };
            group_of.insert(name, idx);
        }

        debug!(
            grouper = self.name(),
            nodes = graph.len(),
            kernels = groups.len(),
            "partitioned graph into kernels"
        );
        Ok(groups)
    }
}

/// One kernel per operator.
pub struct SingletonGrouper;

impl FusionGrouper for SingletonGrouper {
    fn name(&self) -> &str {
        "singleton"
    }

    fn group(&self, graph: &Graph) -> Result<Vec<KernelGroup>, GraphError> {
        Ok(graph
            .topological_order()?
            .into_iter()
            .map(|name| KernelGroup {
                nodes: vec![name.to_string()],
            })
            .collect())
    }
}

/// Check that `groups` cover every node exactly once and that no group
/// depends on a node placed in a later group.
pub fn verify_partition(graph: &Graph, groups: &[KernelGroup]) -> Result<(), GraphError> {
    let mut group_of: HashMap<&str, usize> = HashMap::with_capacity(graph.len());
    for (idx, group) in groups.iter().enumerate() {
        if group.is_empty() {
            return Err(GraphError::InvalidPartition(format!("group {idx} is empty")));
        }
        for name in &group.nodes {
            if !graph.contains(name) {
                return Err(GraphError::UnknownNode(name.clone()));
            }
            if group_of.insert(name.as_str(), idx).is_some() {
                return Err(GraphError::InvalidPartition(format!(
                    "node `{name}` appears in more than one group"
                )));
            }
        }
    }

    if group_of.len() != graph.len() {
        return Err(GraphError::InvalidPartition(format!(
            "{} of {} nodes are not covered",
            graph.len() - group_of.len(),
            graph.len()
        )));
    }

    for (idx, group) in groups.iter().enumerate() {
        for (pos, name) in group.nodes.iter().enumerate() {
            for pred in graph.predecessors(name) {
                let pred_idx = group_of[pred];
                let ordered = if pred_idx == idx {
                    group.nodes[..pos].iter().any(|n| n == pred)
                } else {
                    pred_idx < idx
                };
                if !ordered {
                    return Err(GraphError::InvalidPartition(format!(
                        "`{name}` in group {idx} precedes its dependency `{pred}`"
                    )));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;

    fn rules() -> FusionRuleDocument {
        FusionRuleDocument::from_json_str(
            r#"{"conv_bn": {"obey": true}, "BN_relu": {"obey": true},
                "conv_relu": {"obey": true}, "add_relu": {"obey": false}}"#,
        )
        .unwrap()
    }

    #[test]
    fn rule_keys_are_case_insensitive() {
        let doc = rules();
        assert_eq!(doc.len(), 4);
        assert!(doc.can_fuse("FusedBatchNorm", "Relu"));
        assert!(doc.can_fuse("Conv2D", "FusedBatchNorm"));
        assert!(!doc.can_fuse("Add", "Relu"));
        assert!(!doc.can_fuse("Relu", "Conv2D"));
    }

    #[test]
    fn fuses_linear_chain() {
        let graph = GraphBuilder::new()
            .input("in", &[1, 8, 8, 3])
            .op("conv", "Conv2D", &["in"], &[1, 8, 8, 16])
            .op("bn", "FusedBatchNorm", &["conv"], &[1, 8, 8, 16])
            .op("relu", "Relu", &["bn"], &[1, 8, 8, 16])
            .build();

        let groups = RuleBasedGrouper::new(rules()).group(&graph).unwrap();
        let nodes: Vec<_> = groups.iter().map(|g| g.nodes.clone()).collect();
        assert_eq!(
            nodes,
            vec![
                vec!["in".to_string()],
                vec!["conv".to_string(), "bn".to_string(), "relu".to_string()],
            ]
        );
        verify_partition(&graph, &groups).unwrap();
    }

    #[test]
    fn branching_output_breaks_fusion() {
        // conv feeds two consumers, so it cannot be fused into either.
        let graph = GraphBuilder::new()
            .input("in", &[1, 8, 8, 3])
            .op("conv", "Conv2D", &["in"], &[1, 8, 8, 16])
            .op("relu", "Relu", &["conv"], &[1, 8, 8, 16])
            .op("bn", "FusedBatchNorm", &["conv"], &[1, 8, 8, 16])
            .op("add", "Add", &["relu", "bn"], &[1, 8, 8, 16])
            .build();

        let groups = RuleBasedGrouper::new(rules()).group(&graph).unwrap();
        assert_eq!(groups.len(), 5);
        verify_partition(&graph, &groups).unwrap();
    }

    #[test]
    fn verify_rejects_bad_partitions() {
        let graph = GraphBuilder::new()
            .input("in", &[1, 4])
            .op("fc", "MatMul", &["in"], &[1, 4])
            .build();

        let missing = vec![KernelGroup {
            nodes: vec!["in".into()],
        }];
        assert!(verify_partition(&graph, &missing).is_err());

        let reversed = vec![
            KernelGroup {
                nodes: vec!["fc".into()],
            },
            KernelGroup {
                nodes: vec!["in".into()],
            },
        ];
        assert!(verify_partition(&graph, &reversed).is_err());

        let duplicated = vec![
            KernelGroup {
                nodes: vec!["in".into(), "fc".into()],
            },
            KernelGroup {
                nodes: vec!["fc".into()],
            },
        ];
        assert!(verify_partition(&graph, &duplicated).is_err());

        let with_empty = vec![
            KernelGroup { nodes: Vec::new() },
            KernelGroup {
                nodes: vec!["in".into(), "fc".into()],
            },
        ];
        assert!(matches!(
            verify_partition(&graph, &with_empty),
            Err(GraphError::InvalidPartition(_))
        ));
    }

    #[test]
    fn singleton_grouper_keeps_every_node_alone() {
        let graph = GraphBuilder::new()
            .input("in", &[1, 8, 8, 3])
            .op("conv", "Conv2D", &["in"], &[1, 8, 8, 16])
            .op("relu", "Relu", &["conv"], &[1, 8, 8, 16])
            .build();
        let groups = SingletonGrouper.group(&graph).unwrap();
        assert!(groups.iter().all(|g| g.len() == 1));
        verify_partition(&graph, &groups).unwrap();
    }
}
