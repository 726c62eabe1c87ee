//! Accuracy evaluation of kernel-level latency predictors.

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod driver;
pub mod export;
pub mod metrics;
pub mod session;

#[cfg(feature = "cli")]
pub use cli::*;
pub use config::*;
pub use driver::*;
pub use export::*;
pub use metrics::*;
pub use session::*;
