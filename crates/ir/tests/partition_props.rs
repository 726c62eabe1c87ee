//! Property tests for kernel partitioning.
//!
//! For arbitrary acyclic graphs and arbitrary fusion rule documents, the
//! rule-based grouper must cover every node exactly once and keep the
//! groups in dependency order.

use kernelmeter_ir::{
    verify_partition, FusionGrouper, FusionRuleDocument, Graph, GraphBuilder, RuleBasedGrouper,
};
use proptest::prelude::*;

const OPS: &[&str] = &[
    "Conv2D",
    "DepthwiseConv2dNative",
    "FusedBatchNorm",
    "Relu",
    "Add",
    "MatMul",
    "Reshape",
];

// ── Strategies ──────────────────────────────────────────────────────────────

/// A random DAG: node `i` may only consume nodes `< i`. Names are drawn from
/// a reversed index so name order and dependency order disagree.
fn arb_graph() -> impl Strategy<Value = Graph> {
    (1usize..14)
        .prop_flat_map(|n| {
            let nodes = (0..n)
                .map(|i| {
                    let inputs = proptest::collection::vec(0..i.max(1), 0..=i.min(3));
                    (0..OPS.len(), inputs)
                })
                .collect::<Vec<_>>();
            (Just(n), nodes)
        })
        .prop_map(|(n, nodes)| {
            let name = |i: usize| format!("node{:02}", n - i);
            let mut builder = GraphBuilder::new();
            for (i, (op, inputs)) in nodes.into_iter().enumerate() {
                let mut inputs: Vec<String> = inputs
                    .into_iter()
                    .filter(|input| *input < i)
                    .map(name)
                    .collect();
                inputs.dedup();
                let refs: Vec<&str> = inputs.iter().map(String::as_str).collect();
                builder = builder.op(name(i), OPS[op], &refs, &[1, 8, 8, 8]);
            }
            builder.build()
        })
}

fn arb_rules() -> impl Strategy<Value = FusionRuleDocument> {
    let pairs = ["conv_bn", "bn_relu", "conv_relu", "add_relu", "dwconv_bn", "fc_relu", "relu_add"];
    proptest::collection::vec(any::<bool>(), pairs.len()).prop_map(move |flags| {
        pairs
            .iter()
            .zip(flags)
            .fold(FusionRuleDocument::new(), |doc, (key, obey)| {
                doc.with_rule(key, obey)
            })
    })
}

// ── Property tests ───────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn partition_covers_every_node_in_order(graph in arb_graph(), rules in arb_rules()) {
        let groups = RuleBasedGrouper::new(rules).group(&graph).unwrap();
        prop_assert!(verify_partition(&graph, &groups).is_ok());
        let covered: usize = groups.iter().map(|g| g.len()).sum();
        prop_assert_eq!(covered, graph.len());
    }

    #[test]
    fn partition_is_deterministic(graph in arb_graph(), rules in arb_rules()) {
        let grouper = RuleBasedGrouper::new(rules);
        let first = grouper.group(&graph).unwrap();
        let second = grouper.group(&graph).unwrap();
        prop_assert_eq!(first, second);
    }
}
