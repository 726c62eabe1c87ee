//! Predictor zoo: hardware profiles, artifact retrieval, cache validation
//! and loading of per-hardware kernel models.

pub mod error;
pub mod fetch;
pub mod loader;
pub mod locks;
pub mod profile;
pub mod validator;

pub use error::{Result, ZooError};
pub use fetch::*;
pub use loader::*;
pub use locks::*;
pub use profile::*;
pub use validator::*;
