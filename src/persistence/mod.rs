//! Persistence layer modules.

pub mod attempt_repo;
pub mod counter_repo;
pub mod db;
pub mod retention;
pub mod schema;

/// Re-export the database pool type for convenience.
pub use sqlx::SqlitePool;
