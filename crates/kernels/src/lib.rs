//! Kernel regression models, feature derivation and model sets.

pub mod features;
pub mod format;
pub mod model;
pub mod registry;

pub use features::*;
pub use format::*;
pub use model::*;
pub use registry::*;
