//! Graph IR consumed by the latency predictors.
//!
//! A graph is a mapping from node name to a node record. Edges are taken from
//! each node's `inbounds` list; names that do not resolve to a node in the
//! graph are treated as external inputs and ignored for ordering purposes.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;

pub type AttrMap = BTreeMap<String, AttrValue>;

#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("graph contains a cycle ({remaining} nodes could not be ordered)")]
    Cycle { remaining: usize },
    #[error("unknown node `{0}`")]
    UnknownNode(String),
    #[error("invalid kernel partition: {0}")]
    InvalidPartition(String),
}

/// Open-ended operator attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<AttrValue>),
    Map(AttrMap),
}

impl AttrValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttrValue::Int(v) => Some(*v),
            AttrValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Int(v) => Some(*v as f64),
            AttrValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Integer list view; a scalar is promoted to a one-element list.
    pub fn as_int_list(&self) -> Option<Vec<i64>> {
        match self {
            AttrValue::List(items) => items.iter().map(AttrValue::as_i64).collect(),
            other => other.as_i64().map(|v| vec![v]),
        }
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Float(value)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Text(value.to_string())
    }
}

impl From<Vec<i64>> for AttrValue {
    fn from(value: Vec<i64>) -> Self {
        AttrValue::List(value.into_iter().map(AttrValue::Int).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeAttr {
    pub name: String,
    #[serde(rename = "type")]
    pub op_type: String,
    #[serde(default)]
    pub input_shape: Vec<Vec<i64>>,
    #[serde(default)]
    pub output_shape: Vec<Vec<i64>>,
    #[serde(default)]
    pub attr: AttrMap,
    /// Per-hardware latency annotation in milliseconds.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub latency: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub inbounds: Vec<String>,
    #[serde(default)]
    pub outbounds: Vec<String>,
    pub attr: NodeAttr,
}

impl Node {
    pub fn op_type(&self) -> &str {
        &self.attr.op_type
    }

    pub fn attribute(&self, key: &str) -> Option<&AttrValue> {
        self.attr.attr.get(key)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Graph {
    nodes: BTreeMap<String, Node>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn insert(&mut self, name: impl Into<String>, node: Node) {
        self.nodes.insert(name.into(), node);
    }

    pub fn get(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.nodes.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.nodes.iter().map(|(name, node)| (name.as_str(), node))
    }

    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// In-graph predecessors of `name`, deduplicated, in inbound order.
    pub fn predecessors<'a>(&'a self, name: &str) -> Vec<&'a str> {
        let mut seen = BTreeSet::new();
        self.nodes
            .get(name)
            .map(|node| {
                node.inbounds
                    .iter()
                    .filter_map(|input| self.nodes.get_key_value(input.as_str()))
                    .map(|(key, _)| key.as_str())
                    .filter(|key| seen.insert(*key))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Successor lists derived from inbounds, so they agree with
    /// [`Graph::predecessors`] even when `outbounds` are stale.
    pub fn successor_map(&self) -> HashMap<&str, Vec<&str>> {
        let mut successors: HashMap<&str, Vec<&str>> =
            self.node_names().map(|name| (name, Vec::new())).collect();
        for name in self.node_names() {
            for pred in self.predecessors(name) {
                if let Some(list) = successors.get_mut(pred) {
                    list.push(name);
                }
            }
        }
        successors
    }

    /// Kahn ordering with ties broken by node name.
    pub fn topological_order(&self) -> Result<Vec<&str>, GraphError> {
        let mut in_degree: HashMap<&str, usize> = self
            .node_names()
            .map(|name| (name, self.predecessors(name).len()))
            .collect();
        let successors = self.successor_map();

        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut order = Vec::with_capacity(self.len());

        while let Some(name) = ready.pop_first() {
            order.push(name);
            for succ in &successors[name] {
                if let Some(degree) = in_degree.get_mut(succ) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(*succ);
                    }
                }
            }
        }

        if order.len() != self.len() {
            return Err(GraphError::Cycle {
                remaining: self.len() - order.len(),
            });
        }
        Ok(order)
    }

    /// Record a latency share for `hardware` on a node. Topology is untouched.
    pub fn annotate_latency(
        &mut self,
        name: &str,
        hardware: &str,
        latency_ms: f64,
    ) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get_mut(name)
            .ok_or_else(|| GraphError::UnknownNode(name.to_string()))?;
        node.attr.latency.insert(hardware.to_string(), latency_ms);
        Ok(())
    }
}
