pub mod classify;
pub mod client;
