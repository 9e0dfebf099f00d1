//! Run orchestration modules.
//!
//! Covers the manual-input pause coordinator, the process-wide run flag,
//! identity generation, the per-attempt session runner with its preview
//! producer, and the cycle scheduler driving attempts in order.

pub mod identity;
pub mod pause;
pub mod preview;
pub mod run_state;
pub mod scheduler;
pub mod session;
