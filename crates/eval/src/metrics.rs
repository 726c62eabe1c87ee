//! Accuracy metrics comparing predicted against measured latencies.
//!
//! Relative error of a pair is `(p - m) / m`. A prediction counts towards
//! `acc5` / `acc10` when its absolute relative error is at most 5% / 10%.

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetricsError {
    #[error("no latency pairs to evaluate")]
    EmptyInput,
    #[error("{predicted} predictions but {measured} measurements")]
    LengthMismatch { predicted: usize, measured: usize },
}

/// What to do with pairs whose measured latency is zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroLatencyPolicy {
    /// Drop the pair from every metric and count it.
    #[default]
    Skip,
    /// Keep the pair with an infinite relative error (zero when the
    /// prediction is zero as well).
    Infinite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyReport {
    pub rmse: f64,
    pub rmspe: f64,
    pub mean_error: f64,
    pub acc5: f64,
    pub acc10: f64,
    pub sample_count: usize,
    #[serde(default)]
    pub skipped_zero_measurements: usize,
}

impl fmt::Display for AccuracyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rmse={:.4} rmspe={:.4} mean_error={:.4} acc5={:.4} acc10={:.4} n={}",
            self.rmse, self.rmspe, self.mean_error, self.acc5, self.acc10, self.sample_count
        )
    }
}

pub fn evaluate(predicted: &[f64], measured: &[f64]) -> Result<AccuracyReport, MetricsError> {
    evaluate_with(predicted, measured, ZeroLatencyPolicy::default())
}

pub fn evaluate_with(
    predicted: &[f64],
    measured: &[f64],
    policy: ZeroLatencyPolicy,
) -> Result<AccuracyReport, MetricsError> {
    if predicted.len() != measured.len() {
        return Err(MetricsError::LengthMismatch {
            predicted: predicted.len(),
            measured: measured.len(),
        });
    }
    if predicted.is_empty() {
        return Err(MetricsError::EmptyInput);
    }

    let (kept, skipped): (Vec<(f64, f64)>, Vec<(f64, f64)>) = predicted
        .iter()
        .copied()
        .zip(measured.iter().copied())
        .partition(|(_, m)| policy == ZeroLatencyPolicy::Infinite || *m != 0.0);
    if kept.is_empty() {
        return Err(MetricsError::EmptyInput);
    }

    let p: Array1<f64> = kept.iter().map(|(p, _)| *p).collect();
    let m: Array1<f64> = kept.iter().map(|(_, m)| *m).collect();
    let n = kept.len() as f64;

    let diff = &p - &m;
    let relative: Array1<f64> = diff
        .iter()
        .zip(m.iter())
        .map(|(d, m)| relative_error(*d, *m))
        .collect();

    let rmse = (diff.mapv(|d| d * d).sum() / n).sqrt();
    let rmspe = (relative.mapv(|r| r * r).sum() / n).sqrt();
    let mean_error = relative.mapv(f64::abs).sum() / n;
    let within = |bound: f64| relative.iter().filter(|r| r.abs() <= bound).count() as f64 / n;

    Ok(AccuracyReport {
        rmse,
        rmspe,
        mean_error,
        acc5: within(0.05),
        acc10: within(0.10),
        sample_count: kept.len(),
        skipped_zero_measurements: skipped.len(),
    })
}

fn relative_error(diff: f64, measured: f64) -> f64 {
    if measured != 0.0 {
        diff / measured
    } else if diff == 0.0 {
        0.0
    } else {
        f64::INFINITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_series_are_perfect() {
        let report = evaluate(&[1.0, 2.5, 40.0], &[1.0, 2.5, 40.0]).unwrap();
        assert_eq!(report.rmse, 0.0);
        assert_eq!(report.rmspe, 0.0);
        assert_eq!(report.mean_error, 0.0);
        assert_eq!(report.acc5, 1.0);
        assert_eq!(report.acc10, 1.0);
        assert_eq!(report.sample_count, 3);
    }

    #[test]
    fn ten_percent_overshoot() {
        let report = evaluate(&[110.0], &[100.0]).unwrap();
        assert!((report.rmse - 10.0).abs() < 1e-12);
        assert!((report.rmspe - 0.10).abs() < 1e-12);
        assert!((report.mean_error - 0.10).abs() < 1e-12);
        assert_eq!(report.acc5, 0.0);
        assert_eq!(report.acc10, 1.0);
    }

    #[test]
    fn accuracy_fractions() {
        let report = evaluate(&[1.0, 1.04, 1.2, 0.5], &[1.0, 1.0, 1.0, 1.0]).unwrap();
        assert_eq!(report.acc5, 0.5);
        assert_eq!(report.acc10, 0.5);
        assert!(report.acc5 <= report.acc10);
    }

    #[test]
    fn input_validation_precedes_arithmetic() {
        assert_eq!(evaluate(&[], &[]), Err(MetricsError::EmptyInput));
        assert_eq!(
            evaluate(&[1.0, 2.0], &[1.0]),
            Err(MetricsError::LengthMismatch {
                predicted: 2,
                measured: 1
            })
        );
    }

    #[test]
    fn zero_measurements_follow_policy() {
        let skipped = evaluate(&[1.0, 2.0], &[0.0, 2.0]).unwrap();
        assert_eq!(skipped.sample_count, 1);
        assert_eq!(skipped.skipped_zero_measurements, 1);
        assert_eq!(skipped.acc5, 1.0);

        assert_eq!(evaluate(&[1.0], &[0.0]), Err(MetricsError::EmptyInput));

        let infinite =
            evaluate_with(&[1.0, 0.0], &[0.0, 0.0], ZeroLatencyPolicy::Infinite).unwrap();
        assert_eq!(infinite.sample_count, 2);
        assert!(infinite.rmspe.is_infinite());
        assert_eq!(infinite.acc10, 0.5);
    }
}
