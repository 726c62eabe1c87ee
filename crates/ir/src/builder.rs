//! Graph builder entrypoints and helpers.

use crate::graph::{AttrValue, Graph, Node, NodeAttr};
use std::collections::BTreeMap;

/// Chained builder that keeps `inbounds` and `outbounds` consistent.
#[derive(Debug, Default, Clone)]
pub struct GraphBuilder {
    graph: Graph,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            graph: Graph::new(),
        }
    }

    pub fn input<N: Into<String>>(self, name: N, shape: &[i64]) -> Self {
        self.op(name, "Placeholder", &[], shape)
    }

    /// Add an operator whose input shapes are the output shapes of `inputs`.
    pub fn op<N: Into<String>>(
        mut self,
        name: N,
        op_type: &str,
        inputs: &[&str],
        output_shape: &[i64],
    ) -> Self {
        let name = name.into();
        let input_shape = inputs
            .iter()
            .filter_map(|input| self.graph.get(input))
            .filter_map(|node| node.attr.output_shape.first().cloned())
            .collect();

        for input in inputs {
            if let Some(upstream) = self.graph.get_mut(input) {
                upstream.outbounds.push(name.clone());
            }
        }

        let node = Node {
            inbounds: inputs.iter().map(|input| input.to_string()).collect(),
            outbounds: Vec::new(),
            attr: NodeAttr {
                name: name.clone(),
                op_type: op_type.to_string(),
                input_shape,
                output_shape: vec![output_shape.to_vec()],
                attr: BTreeMap::new(),
                latency: BTreeMap::new(),
            },
        };
        self.graph.insert(name, node);
        self
    }

    /// Attach an attribute to an already-added node; unknown names are ignored.
    pub fn attr<V: Into<AttrValue>>(mut self, node: &str, key: &str, value: V) -> Self {
        if let Some(node) = self.graph.get_mut(node) {
            node.attr.attr.insert(key.to_string(), value.into());
        }
        self
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn build(self) -> Graph {
        self.graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_wires_edges_and_shapes() {
        let graph = GraphBuilder::new()
            .input("in", &[1, 16, 16, 8])
            .op("conv", "Conv2D", &["in"], &[1, 8, 8, 32])
            .attr("conv", "kernel_shape", vec![3i64, 3])
            .attr("conv", "strides", vec![1i64, 2, 2, 1])
            .build();

        let input = graph.get("in").unwrap();
        assert_eq!(input.outbounds, vec!["conv".to_string()]);
        let conv = graph.get("conv").unwrap();
        assert_eq!(conv.inbounds, vec!["in".to_string()]);
        assert_eq!(conv.attr.input_shape, vec![vec![1, 16, 16, 8]]);
        assert_eq!(conv.attr.output_shape, vec![vec![1, 8, 8, 32]]);
        assert!(conv.attribute("kernel_shape").is_some());
    }
}
