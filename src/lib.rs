#![forbid(unsafe_code)]

//! Operator-supervised form automation.
//!
//! A [`CycleScheduler`](orchestrator::scheduler::CycleScheduler) runs one
//! attempt per proxy context; each attempt acquires a fresh environment,
//! executes the declarative flow, and may pause for operator input relayed
//! over the observer channel.

pub mod config;
pub mod driver;
pub mod errors;
pub mod flow;
pub mod ipc;
pub mod models;
pub mod observer;
pub mod orchestrator;
pub mod persistence;
pub mod state;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
