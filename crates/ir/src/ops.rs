//! Operator name canonicalisation.
//!
//! Converters emit framework-flavoured operator types (`Conv2D`, `Conv`,
//! `DepthwiseConv2dNative`, ...). Fusion rules and kernel ids are keyed by a
//! small canonical vocabulary instead.

/// Operators that never form a kernel and contribute no latency.
const ZERO_COST: &[&str] = &[
    "placeholder",
    "input",
    "const",
    "identity",
    "reshape",
    "flatten",
    "squeeze",
    "shape",
];

pub fn canonical_op(op_type: &str) -> String {
    let lowered = op_type.to_ascii_lowercase();
    let canonical = match lowered.as_str() {
        "conv2d" | "conv" => "conv",
        "depthwiseconv2dnative" | "depthwiseconv2d" | "dwconv" | "dwconv2d" => "dwconv",
        "fusedbatchnorm" | "fusedbatchnormv3" | "batchnormalization" | "batchnorm" | "bn" => "bn",
        "matmul" | "gemm" | "dense" | "linear" | "fc" => "fc",
        "maxpool" | "maxpool2d" => "maxpool",
        "avgpool" | "averagepool" | "avgpool2d" => "avgpool",
        "mean" | "globalaveragepool" | "global-avgpool" | "gap" => "global-avgpool",
        "concatv2" | "concat" => "concat",
        "addv2" | "add" => "add",
        "relu" => "relu",
        "relu6" => "relu6",
        "hardswish" | "hswish" => "hswish",
        "hardsigmoid" | "hsigmoid" => "hsigmoid",
        "channel_shuffle" | "channelshuffle" => "channelshuffle",
        "splitv" | "split" => "split",
        _ => return lowered,
    };
    canonical.to_string()
}

pub fn is_zero_cost(op_type: &str) -> bool {
    let canonical = canonical_op(op_type);
    ZERO_COST.contains(&canonical.as_str())
}
