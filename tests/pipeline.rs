use anyhow::Result;
use kernelmeter_dataset::{read_records, BenchmarkRecord};
use kernelmeter_eval::{
    export_node_latency, DriverOptions, EvaluationDriver, MeterConfig, MeterSession,
};
use kernelmeter_ir::{Graph, GraphBuilder};
use kernelmeter_kernels::{DecisionTree, LinearModel, ModelDefinition, RandomForest, TreeNode};
use kernelmeter_predictor::ModelType;
use kernelmeter_zoo::{
    extract_archive, ArtifactFetcher, HardwareProfile, HardwareRegistry, ZooError,
};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

const ZOO_URL: &str = "https://example.com/predictors/gpu.zip";
const DATASET_URL: &str = "https://example.com/datasets.zip";

/// Serves local zip archives in place of HTTP downloads.
struct ArchiveFetcher {
    archives: HashMap<String, PathBuf>,
    calls: AtomicUsize,
}

impl ArtifactFetcher for ArchiveFetcher {
    fn fetch(&self, url: &str, dest_dir: &Path) -> kernelmeter_zoo::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let archive = self.archives.get(url).ok_or_else(|| ZooError::Transport {
            url: url.to_string(),
            reason: "404 Not Found".to_string(),
        })?;
        fs::create_dir_all(dest_dir).map_err(|source| ZooError::Io {
            path: dest_dir.to_path_buf(),
            source,
        })?;
        extract_archive(archive, dest_dir)
    }
}

fn write_zip(path: &Path, entries: &[(String, String)]) -> Result<()> {
    let mut zip = zip::ZipWriter::new(File::create(path)?);
    for (name, body) in entries {
        zip.start_file(name.as_str(), SimpleFileOptions::default())?;
        zip.write_all(body.as_bytes())?;
    }
    zip.finish()?;
    Ok(())
}

fn leaf(value: f64) -> DecisionTree {
    DecisionTree::new(vec![TreeNode::Leaf { leaf: value }])
}

fn mobile_block() -> Graph {
    GraphBuilder::new()
        .input("input", &[1, 16, 16, 3])
        .op("conv", "Conv2D", &["input"], &[1, 16, 16, 8])
        .attr("conv", "kernel_shape", vec![3i64, 3])
        .op("bn", "FusedBatchNormV3", &["conv"], &[1, 16, 16, 8])
        .op("relu", "Relu", &["bn"], &[1, 16, 16, 8])
        .op("flatten", "Reshape", &["relu"], &[1, 2048])
        .op("logits", "MatMul", &["flatten"], &[1, 10])
        .build()
}

struct Fixture {
    _root: TempDir,
    session: MeterSession,
    fetcher: Arc<ArchiveFetcher>,
}

fn fixture() -> Result<Fixture> {
    let root = TempDir::new()?;
    let archives = root.path().join("archives");
    fs::create_dir_all(&archives)?;

    let conv = ModelDefinition::RandomForest(RandomForest::new(vec![leaf(2.0), leaf(4.0)]));
    let fc = ModelDefinition::Linear(LinearModel::new(vec![0.0, 0.1, 0.0, 0.0], 0.5));
    let bn = ModelDefinition::DecisionTree(leaf(0.4));
    let relu = ModelDefinition::DecisionTree(leaf(0.2));
    let zoo_zip = archives.join("gpu.zip");
    write_zip(
        &zoo_zip,
        &[
            ("gpu/conv-bn-relu.model".into(), serde_json::to_string(&conv)?),
            ("gpu/fc.model".into(), serde_json::to_string(&fc)?),
            ("gpu/bn.model".into(), serde_json::to_string(&bn)?),
            ("gpu/relu.model".into(), serde_json::to_string(&relu)?),
            (
                "gpu/rule_gpu.json".into(),
                r#"{"conv_bn": {"obey": true}, "bn_relu": {"obey": true}, "relu_fc": {"obey": false}}"#
                    .into(),
            ),
        ],
    )?;

    let lines = [Some(4.5), None, Some(5.0)]
        .into_iter()
        .map(|measured| {
            let record =
                BenchmarkRecord::new(mobile_block()).with_measured_latency("gpu", measured);
            serde_json::to_string(&record)
        })
        .collect::<Result<Vec<_>, _>>()?;
    let dataset_zip = archives.join("datasets.zip");
    write_zip(
        &dataset_zip,
        &[("datasets/mobile_blocks.jsonl".into(), lines.join("\n"))],
    )?;

    let fetcher = Arc::new(ArchiveFetcher {
        archives: HashMap::from([
            (ZOO_URL.to_string(), zoo_zip),
            (DATASET_URL.to_string(), dataset_zip),
        ]),
        calls: AtomicUsize::new(0),
    });
    let registry = HardwareRegistry::from_profiles(vec![HardwareProfile::new(
        "gpu",
        "1.0",
        vec!["conv-bn-relu".to_string(), "fc".to_string()],
        ZOO_URL,
    )])?;
    let config = MeterConfig {
        zoo_root: root.path().join("zoo"),
        dataset_url: DATASET_URL.to_string(),
        dataset_dir: root.path().join("dataset"),
        ..MeterConfig::default()
    };
    let session = MeterSession::new(config, registry, fetcher.clone());
    Ok(Fixture {
        _root: root,
        session,
        fetcher,
    })
}

#[test]
fn predicts_from_a_fetched_zoo() -> Result<()> {
    let fixture = fixture()?;
    let predictor = fixture.session.predictor_by_name("gpu", None)?;
    let latency = predictor.predict(&mobile_block(), ModelType::GraphIr)?;
    assert!((latency - 4.5).abs() < 1e-9);

    let again = fixture.session.predictor_by_name("gpu", Some("1.0"))?;
    assert_eq!(again.predict(&mobile_block(), ModelType::GraphIr)?, latency);
    assert_eq!(fixture.fetcher.calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn evaluates_the_benchmark_dataset() -> Result<()> {
    let fixture = fixture()?;
    let files = fixture.session.dataset_files()?;
    assert_eq!(files.len(), 1);

    let outcome = EvaluationDriver::new(
        &fixture.session,
        DriverOptions {
            keep_predictions: true,
            ..DriverOptions::default()
        },
    )
    .run_all(&files);
    assert!(outcome.failures.is_empty(), "{:?}", outcome.failures);
    assert_eq!(outcome.reports.len(), 1);

    let report = &outcome.reports[0];
    assert_eq!(report.accuracy.sample_count, 2);
    assert_eq!(report.accuracy.acc5, 0.5);
    assert_eq!(report.accuracy.acc10, 1.0);
    assert_eq!(report.predictions.len(), 2);

    let json = serde_json::to_value(report)?;
    let keys = [
        "file",
        "hardware",
        "version",
        "rmse",
        "rmspe",
        "mean_error",
        "acc5",
        "acc10",
        "sample_count",
    ];
    for key in keys {
        assert!(json.get(key).is_some(), "missing `{key}` in report");
    }
    Ok(())
}

#[test]
fn exports_node_latency() -> Result<()> {
    let fixture = fixture()?;
    let files = fixture.session.dataset_files()?;
    let predictor = fixture.session.predictor_by_name("gpu", None)?;
    let output = files[0].with_file_name("annotated.jsonl");

    let summary = export_node_latency(&predictor, &files[0], &output)?;
    assert_eq!(summary.records, 3);
    // Every node with an input is annotated: conv, bn, relu, flatten, logits.
    assert_eq!(summary.failed_nodes, 0);
    assert_eq!(summary.annotated_nodes, 15);

    for item in read_records(&output)? {
        let (_, record) = item?;
        for (name, node) in record.graph.nodes() {
            let annotated = node.attr.latency.contains_key("gpu");
            assert_eq!(annotated, name != "input", "node {name}");
        }
        // A lone conv resolves to the conv-bn-relu family model.
        assert_eq!(record.graph.get("conv").unwrap().attr.latency["gpu"], 3.0);
        assert_eq!(record.graph.get("bn").unwrap().attr.latency["gpu"], 0.4);
        assert_eq!(record.graph.get("relu").unwrap().attr.latency["gpu"], 0.2);
    }
    Ok(())
}
