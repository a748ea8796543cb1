pub mod action;
pub mod config;
pub mod fleet;
pub mod state;
pub mod workflow;

#[macro_use]
extern crate tracing;
