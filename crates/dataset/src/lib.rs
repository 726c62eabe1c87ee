//! Benchmark datasets: acquisition and line-delimited record access.

pub mod error;
pub mod provider;
pub mod records;

pub use error::{DatasetError, Result};
pub use provider::*;
pub use records::*;
