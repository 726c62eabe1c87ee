//! Graph IR, operator canonicalisation and kernel fusion grouping.

pub mod builder;
pub mod fusion;
pub mod graph;
pub mod ops;

pub use builder::*;
pub use fusion::*;
pub use graph::*;
pub use ops::*;
