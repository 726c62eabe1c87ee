//! CLI wiring for kernelmeter.

use crate::config::MeterConfig;
use crate::driver::EvaluationDriver;
use crate::export::export_node_latency;
use crate::session::MeterSession;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use kernelmeter_ir::Graph;
use kernelmeter_predictor::ModelType;
use std::fs;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "kernelmeter", about = "Kernel-level latency prediction toolkit")]
pub struct Cli {
    /// YAML configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the hardware profiles of the registry.
    ListHardware,
    /// Predict the latency of a graph IR file on one hardware profile.
    Predict {
        #[arg(long)]
        graph: PathBuf,
        #[arg(long)]
        hardware: String,
        #[arg(long)]
        version: Option<String>,
        #[arg(long, default_value = "graph-ir")]
        model_type: ModelType,
        /// Print per-kernel estimates as JSON.
        #[arg(long, default_value_t = false)]
        kernels: bool,
    },
    /// Evaluate predictors against the benchmark dataset and emit a JSON report.
    Evaluate {
        /// Restrict to one hardware profile (all profiles otherwise).
        #[arg(long)]
        hardware: Option<String>,
        #[arg(long)]
        version: Option<String>,
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long, default_value_t = false)]
        parallel: bool,
        #[arg(long, default_value_t = false)]
        keep_predictions: bool,
    },
    /// Annotate every node of a dataset file with its predicted latency.
    ExportLatency {
        #[arg(long)]
        hardware: String,
        #[arg(long)]
        version: Option<String>,
        /// Dataset file; defaults to the first file of the benchmark dataset.
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long, default_value = "output.jsonl")]
        output: PathBuf,
    },
}

pub fn run_cli(cli: Cli) -> Result<()> {
    tracing_subscriber::fmt::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let Cli { config, command } = cli;
    let mut config = MeterConfig::load(config.as_deref())?;

    match command {
        Command::ListHardware => {
            let session = MeterSession::from_config(config)?;
            for profile in session.registry().iter() {
                let cached = if session.loader().is_cached(profile) {
                    "cached"
                } else {
                    "not cached"
                };
                println!(
                    "[Predictor] {}: version={} ({cached})",
                    profile.name, profile.version
                );
            }
        }
        Command::Predict {
            graph,
            hardware,
            version,
            model_type,
            kernels,
        } => {
            let session = MeterSession::from_config(config)?;
            let blob = fs::read_to_string(&graph)
                .with_context(|| format!("failed to read graph {}", graph.display()))?;
            let ir = Graph::from_json_str(&blob)
                .with_context(|| format!("failed to parse graph {}", graph.display()))?;
            let predictor = session.predictor_by_name(&hardware, version.as_deref())?;

            let latency = predictor.predict(&ir, model_type)?;
            if kernels {
                let estimates = predictor.predict_kernels(&ir)?;
                println!("{}", serde_json::to_string_pretty(&estimates)?);
            }
            info!(
                hardware = %hardware,
                nodes = ir.len(),
                latency_ms = latency,
                "prediction completed"
            );
            println!(
                "{}: predicted latency {:.4} ms on {}@{}",
                graph.display(),
                latency,
                predictor.hardware(),
                predictor.version()
            );
        }
        Command::Evaluate {
            hardware,
            version,
            output,
            parallel,
            keep_predictions,
        } => {
            config.parallel |= parallel;
            config.keep_predictions |= keep_predictions;
            let session = MeterSession::from_config(config)?;
            let profiles = match hardware {
                Some(name) => vec![session.profile(&name, version.as_deref())?.clone()],
                None => session.registry().profiles().to_vec(),
            };
            let files = session.dataset_files()?;
            if files.is_empty() {
                bail!(
                    "no dataset files under {}",
                    session.config().dataset_dir.display()
                );
            }

            let outcome = EvaluationDriver::from_session(&session).run(&profiles, &files);
            for report in &outcome.reports {
                println!(
                    "- {} on {}@{}: {}",
                    report.file, report.hardware, report.version, report.accuracy
                );
            }
            for failure in &outcome.failures {
                eprintln!(
                    "! {}@{} {:?} {}{}: {}",
                    failure.hardware,
                    failure.version,
                    failure.stage,
                    failure.file.as_deref().unwrap_or("-"),
                    failure
                        .record
                        .map(|index| format!("[{index}]"))
                        .unwrap_or_default(),
                    failure.message
                );
            }

            if let Some(path) = output {
                let json = serde_json::to_string_pretty(&outcome)?;
                fs::write(&path, json)
                    .with_context(|| format!("failed to write report {}", path.display()))?;
            }
        }
        Command::ExportLatency {
            hardware,
            version,
            input,
            output,
        } => {
            let session = MeterSession::from_config(config)?;
            let predictor = session.predictor_by_name(&hardware, version.as_deref())?;
            let input = match input {
                Some(path) => path,
                None => session
                    .dataset_files()?
                    .into_iter()
                    .next()
                    .context("benchmark dataset is empty")?,
            };
            let summary = export_node_latency(&predictor, &input, &output)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }
    Ok(())
}
