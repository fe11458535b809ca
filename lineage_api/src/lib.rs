//! Shared lineage data models consumed by the core library and source crates.

pub mod blame;
pub mod outcome;
pub mod paths;

pub use blame::*;
pub use outcome::*;
pub use paths::*;
