//! Per-node latency export: predict every operator of a benchmark record in
//! isolation and store the estimate on the node.

use anyhow::Result;
use kernelmeter_dataset::{read_records, BenchmarkRecord, RecordWriter};
use kernelmeter_ir::{Graph, Node, NodeAttr};
use kernelmeter_predictor::{KernelLevelPredictor, ModelType};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub records: usize,
    pub annotated_nodes: usize,
    pub failed_nodes: usize,
    pub skipped_records: usize,
}

fn placeholder(name: &str) -> Node {
    Node {
        inbounds: Vec::new(),
        outbounds: Vec::new(),
        attr: NodeAttr {
            name: name.to_string(),
            op_type: "Placeholder".to_string(),
            input_shape: Vec::new(),
            output_shape: Vec::new(),
            attr: BTreeMap::new(),
            latency: BTreeMap::new(),
        },
    }
}

/// `name` on its own, fed by placeholders standing in for its inputs.
/// `None` for unknown nodes and for nodes without inbounds.
pub fn single_op_graph(graph: &Graph, name: &str) -> Option<Graph> {
    let node = graph.get(name)?;
    if node.inbounds.is_empty() {
        return None;
    }
    let mut single = Graph::new();
    for input in &node.inbounds {
        if input != name {
            single.insert(input.clone(), placeholder(input));
        }
    }
    single.insert(name, node.clone());
    Some(single)
}

/// Annotate every node with inbounds; returns `(annotated, failed)` counts.
pub fn annotate_record(
    predictor: &KernelLevelPredictor,
    record: &mut BenchmarkRecord,
) -> (usize, usize) {
    let names: Vec<String> = record.graph.node_names().map(str::to_string).collect();
    let (mut annotated, mut failed) = (0, 0);
    for name in names {
        let Some(single) = single_op_graph(&record.graph, &name) else {
            continue;
        };
        let latency = predictor
            .predict(&single, ModelType::GraphIr)
            .map_err(anyhow::Error::from)
            .and_then(|ms| {
                record
                    .graph
                    .annotate_latency(&name, predictor.hardware(), ms)?;
                Ok(ms)
            });
        match latency {
            Ok(_) => annotated += 1,
            Err(err) => {
                warn!(
                    node = %name,
                    hardware = predictor.hardware(),
                    error = %err,
                    "node left unannotated"
                );
                failed += 1;
            }
        }
    }
    (annotated, failed)
}

/// Annotate every record of `input` and append it to `output`.
pub fn export_node_latency(
    predictor: &KernelLevelPredictor,
    input: &Path,
    output: &Path,
) -> Result<ExportSummary> {
    let mut summary = ExportSummary::default();
    let mut writer = RecordWriter::append(output)?;
    for item in read_records(input)? {
        let mut record = match item {
            Ok((_, record)) => record,
            Err(err) => {
                warn!(file = %input.display(), error = %err, "skipping record");
                summary.skipped_records += 1;
                continue;
            }
        };
        let (annotated, failed) = annotate_record(predictor, &mut record);
        summary.annotated_nodes += annotated;
        summary.failed_nodes += failed;
        writer.write(&record)?;
        summary.records += 1;
    }
    writer.finish()?;
    info!(
        input = %input.display(),
        output = %output.display(),
        records = summary.records,
        annotated = summary.annotated_nodes,
        failed = summary.failed_nodes,
        "exported node latencies"
    );
    Ok(summary)
}
