pub mod config;
pub mod error;
pub mod handle;
pub mod kernel;
pub mod outputs;
pub mod pattern;
pub mod services;

pub use config::EngineConfig;
pub use handle::{EngineHandle, EngineParts};
pub use kernel::reactor::Reactor;
