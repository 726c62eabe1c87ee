//! Kernel-level latency prediction for graph IR.

pub mod error;
pub mod planner;
pub mod predictor;

pub use error::*;
pub use planner::*;
pub use predictor::*;
