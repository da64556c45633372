pub mod evaluator;
pub mod event;
pub mod reactor;
pub mod scheduler;
pub mod sensors;
pub mod session;
pub mod state;
pub mod telemetry;
pub mod time;
