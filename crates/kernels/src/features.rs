//! Kernel-type ids and feature vectors derived from kernel groups.
//!
//! Shapes are read as NHWC. The feature layout depends on the kernel family,
//! which is decided by the first latency-bearing operator of the group:
//!
//! | family              | features                                           |
//! |---------------------|----------------------------------------------------|
//! | `conv`              | hw, cin, cout, kernel size, stride, MFLOPs, Mparams |
//! | `dwconv`            | hw, cin, kernel size, stride, MFLOPs, Mparams      |
//! | `fc`                | cin, cout, MFLOPs, Mparams                         |
//! | `maxpool`/`avgpool` | hw, cin, kernel size, stride                       |
//! | `concat`            | hw, summed input channels                          |
//! | anything else       | hw, cin                                            |

use kernelmeter_ir::{canonical_op, is_zero_cost, Graph, GraphError, KernelGroup, Node};
use ndarray::Array1;

#[derive(Debug, Clone, PartialEq)]
pub struct KernelFeatures {
    pub kernel_type: String,
    pub values: Array1<f64>,
}

/// Latency-bearing nodes of a group, in group order.
fn costed_nodes<'g>(
    graph: &'g Graph,
    group: &KernelGroup,
) -> Result<Vec<&'g Node>, GraphError> {
    let mut nodes = Vec::with_capacity(group.len());
    for name in &group.nodes {
        let node = graph
            .get(name)
            .ok_or_else(|| GraphError::UnknownNode(name.clone()))?;
        if !is_zero_cost(node.op_type()) {
            nodes.push(node);
        }
    }
    Ok(nodes)
}

/// Kernel-type id such as `conv-bn-relu`; `None` for zero-cost groups.
pub fn kernel_type(graph: &Graph, group: &KernelGroup) -> Result<Option<String>, GraphError> {
    let nodes = costed_nodes(graph, group)?;
    if nodes.is_empty() {
        return Ok(None);
    }
    Ok(Some(join_ops(&nodes)))
}

/// Model id published for the family of `kernel_type`. Zoos ship one model
/// per family, so a conv group maps to `conv-bn-relu` whatever it fused.
/// Ids outside a known family are returned unchanged.
pub fn kernel_family(kernel_type: &str) -> String {
    let family = match kernel_type {
        t if t.starts_with("dwconv") => "dwconv-bn-relu",
        t if t.starts_with("conv") => "conv-bn-relu",
        "fc-relu" => "fc",
        "bn-relu" => "bnrelu",
        "add-relu" => "addrelu",
        "se-relu" => "se",
        other => other,
    };
    family.to_string()
}

fn join_ops(nodes: &[&Node]) -> String {
    nodes
        .iter()
        .map(|node| canonical_op(node.op_type()))
        .collect::<Vec<_>>()
        .join("-")
}

pub fn extract_features(
    graph: &Graph,
    group: &KernelGroup,
) -> Result<Option<KernelFeatures>, GraphError> {
    let nodes = costed_nodes(graph, group)?;
    let Some(head) = nodes.first() else {
        return Ok(None);
    };
    let kernel_type = join_ops(&nodes);

    let (hw, cin) = spatial_dims(head.attr.input_shape.first());
    let (hw_out, cout) = spatial_dims(head.attr.output_shape.first());
    let ks = window_param(head, &["kernel_shape", "ks", "ksize"]);
    let stride = window_param(head, &["strides", "stride"]);

    let values = match canonical_op(head.op_type()).as_str() {
        "conv" => {
            let mflops = 2.0 * hw_out * hw_out * cin * cout * ks * ks / 1.0e6;
            let mparams = (cin * cout * ks * ks + cout) / 1.0e6;
            vec![hw, cin, cout, ks, stride, mflops, mparams]
        }
        "dwconv" => {
            let mflops = 2.0 * hw_out * hw_out * cin * ks * ks / 1.0e6;
            let mparams = (cin * ks * ks + cin) / 1.0e6;
            vec![hw, cin, ks, stride, mflops, mparams]
        }
        "fc" => {
            let mflops = 2.0 * cin * cout / 1.0e6;
            let mparams = (cin * cout + cout) / 1.0e6;
            vec![cin, cout, mflops, mparams]
        }
        "maxpool" | "avgpool" => vec![hw, cin, ks, stride],
        "concat" => {
            let channels = head
                .attr
                .input_shape
                .iter()
                .map(|shape| spatial_dims(Some(shape)).1)
                .sum::<f64>();
            vec![hw, channels]
        }
        _ => vec![hw, cin],
    };

    Ok(Some(KernelFeatures {
        kernel_type,
        values: Array1::from(values),
    }))
}

/// `(spatial extent, channels)` of an NHWC-ish shape.
fn spatial_dims(shape: Option<&Vec<i64>>) -> (f64, f64) {
    let dims: Vec<f64> = shape
        .map(|dims| dims.iter().map(|d| (*d).max(0) as f64).collect())
        .unwrap_or_default();
    match dims.as_slice() {
        [_, h, _, c] => (*h, *c),
        [_, h, c] => (*h, *c),
        [_, c] => (1.0, *c),
        [c] => (1.0, *c),
        _ => (1.0, 0.0),
    }
}

/// Window attributes come as `[k]`, `[kh, kw]` or NHWC `[1, kh, kw, 1]`.
fn window_param(node: &Node, keys: &[&str]) -> f64 {
    keys.iter()
        .filter_map(|key| node.attribute(key))
        .find_map(|value| value.as_int_list())
        .and_then(|list| match list.as_slice() {
            [_, k, _, _] => Some(*k),
            [k, ..] => Some(*k),
            [] => None,
        })
        .map(|k| k.max(1) as f64)
        .unwrap_or(1.0)
}
