//! Pattern graphs: the authored wire model, install-time compilation, curves, and on-disk
//! libraries.

pub mod compile;
pub mod curve;
pub mod library;
pub mod model;

pub use compile::{compile, CompiledPattern};
pub use model::PatternGraph;
