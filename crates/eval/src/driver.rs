//! Evaluation driver: predict every benchmark record on every hardware
//! profile and compare against the measured latencies.
//!
//! Failures are isolated. A profile that cannot be loaded is skipped, a file
//! that cannot be read is skipped for that profile, and a record that cannot
//! be decoded or predicted is skipped. Each is reported as an
//! [`EvaluationFailure`].

use crate::metrics::{evaluate_with, AccuracyReport, ZeroLatencyPolicy};
use crate::session::MeterSession;
use kernelmeter_dataset::{read_records, DatasetError};
use kernelmeter_predictor::{KernelLevelPredictor, ModelType};
use kernelmeter_zoo::HardwareProfile;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverOptions {
    pub parallel: bool,
    pub keep_predictions: bool,
    pub zero_policy: ZeroLatencyPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    /// `<file>[<index>]`
    pub source_id: String,
    pub hardware: String,
    pub predicted_ms: f64,
    pub measured_ms: Option<f64>,
}

/// Accuracy of one hardware profile on one dataset file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileReport {
    pub file: String,
    pub hardware: String,
    pub version: String,
    #[serde(flatten)]
    pub accuracy: AccuracyReport,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub predictions: Vec<PredictionRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    LoadPredictor,
    ReadFile,
    DecodeRecord,
    Predict,
    Evaluate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationFailure {
    pub hardware: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<usize>,
    pub stage: FailureStage,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    pub reports: Vec<FileReport>,
    pub failures: Vec<EvaluationFailure>,
}

impl EvaluationOutcome {
    fn merge(mut self, other: EvaluationOutcome) -> Self {
        self.reports.extend(other.reports);
        self.failures.extend(other.failures);
        self
    }
}

pub struct EvaluationDriver<'s> {
    session: &'s MeterSession,
    options: DriverOptions,
}

impl<'s> EvaluationDriver<'s> {
    pub fn new(session: &'s MeterSession, options: DriverOptions) -> Self {
        Self { session, options }
    }

    /// Options taken from the session's configuration.
    pub fn from_session(session: &'s MeterSession) -> Self {
        let config = session.config();
        Self::new(
            session,
            DriverOptions {
                parallel: config.parallel,
                keep_predictions: config.keep_predictions,
                zero_policy: config.zero_latency_policy,
            },
        )
    }

    /// Evaluate `profiles` against `files`. Reports keep profile order, then
    /// file order.
    pub fn run(&self, profiles: &[HardwareProfile], files: &[PathBuf]) -> EvaluationOutcome {
        let outcomes: Vec<EvaluationOutcome> = if self.options.parallel {
            profiles
                .par_iter()
                .map(|profile| self.run_profile(profile, files))
                .collect()
        } else {
            profiles
                .iter()
                .map(|profile| self.run_profile(profile, files))
                .collect()
        };
        let outcome = outcomes
            .into_iter()
            .fold(EvaluationOutcome::default(), EvaluationOutcome::merge);
        info!(
            reports = outcome.reports.len(),
            failures = outcome.failures.len(),
            "evaluation finished"
        );
        outcome
    }

    /// Evaluate every profile of the session's registry.
    pub fn run_all(&self, files: &[PathBuf]) -> EvaluationOutcome {
        self.run(self.session.registry().profiles(), files)
    }

    fn run_profile(&self, profile: &HardwareProfile, files: &[PathBuf]) -> EvaluationOutcome {
        let mut outcome = EvaluationOutcome::default();
        let predictor = match self.session.predictor(profile) {
            Ok(predictor) => predictor,
            Err(err) => {
                let message = format!("{err:#}");
                warn!(hardware = %profile, error = %message, "skipping hardware");
                outcome.failures.push(failure(
                    profile,
                    None,
                    None,
                    FailureStage::LoadPredictor,
                    message,
                ));
                return outcome;
            }
        };

        for file in files {
            self.run_file(profile, &predictor, file, &mut outcome);
        }
        outcome
    }

    fn run_file(
        &self,
        profile: &HardwareProfile,
        predictor: &KernelLevelPredictor,
        file: &Path,
        outcome: &mut EvaluationOutcome,
    ) {
        let file_name = file.display().to_string();
        let records = match read_records(file) {
            Ok(records) => records,
            Err(err) => {
                warn!(
                    hardware = %profile,
                    file = %file_name,
                    error = %err,
                    "skipping dataset file"
                );
                outcome.failures.push(failure(
                    profile,
                    Some(&file_name),
                    None,
                    FailureStage::ReadFile,
                    err.to_string(),
                ));
                return;
            }
        };

        let mut predicted = Vec::new();
        let mut measured = Vec::new();
        let mut kept = Vec::new();
        for item in records {
            let (index, record) = match item {
                Ok(item) => item,
                Err(DatasetError::Decode { line, source, .. }) => {
                    outcome.failures.push(failure(
                        profile,
                        Some(&file_name),
                        Some(line),
                        FailureStage::DecodeRecord,
                        source.to_string(),
                    ));
                    continue;
                }
                Err(err) => {
                    warn!(
                        hardware = %profile,
                        file = %file_name,
                        error = %err,
                        "aborting dataset file"
                    );
                    outcome.failures.push(failure(
                        profile,
                        Some(&file_name),
                        None,
                        FailureStage::ReadFile,
                        err.to_string(),
                    ));
                    break;
                }
            };

            let Some(measured_ms) = record.measured_latency(&profile.name) else {
                continue;
            };
            let source_id = format!("{file_name}[{index}]");
            let predicted_ms = match predictor.predict(&record.graph, ModelType::GraphIr) {
                Ok(latency) => latency,
                Err(err) => {
                    debug!(source = %source_id, error = %err, "prediction failed");
                    outcome.failures.push(failure(
                        profile,
                        Some(&file_name),
                        Some(index),
                        FailureStage::Predict,
                        err.to_string(),
                    ));
                    continue;
                }
            };
            debug!(source = %source_id, predicted_ms, measured_ms, "record predicted");

            predicted.push(predicted_ms);
            measured.push(measured_ms);
            if self.options.keep_predictions {
                kept.push(PredictionRecord {
                    source_id,
                    hardware: profile.name.clone(),
                    predicted_ms,
                    measured_ms: Some(measured_ms),
                });
            }
        }

        if predicted.is_empty() {
            return;
        }
        match evaluate_with(&predicted, &measured, self.options.zero_policy) {
            Ok(accuracy) => {
                info!(
                    file = %file_name,
                    hardware = %profile,
                    rmse = accuracy.rmse,
                    acc5 = accuracy.acc5,
                    acc10 = accuracy.acc10,
                    samples = accuracy.sample_count,
                    "file evaluated"
                );
                outcome.reports.push(FileReport {
                    file: file_name,
                    hardware: profile.name.clone(),
                    version: profile.version.clone(),
                    accuracy,
                    predictions: kept,
                });
            }
            Err(err) => outcome.failures.push(failure(
                profile,
                Some(&file_name),
                None,
                FailureStage::Evaluate,
                err.to_string(),
            )),
        }
    }
}

fn failure(
    profile: &HardwareProfile,
    file: Option<&str>,
    record: Option<usize>,
    stage: FailureStage,
    message: String,
) -> EvaluationFailure {
    EvaluationFailure {
        hardware: profile.name.clone(),
        version: profile.version.clone(),
        file: file.map(str::to_string),
        record,
        stage,
        message,
    }
}
