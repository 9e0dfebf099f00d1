//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all infrastructure failure modes.
///
/// Attempt-level failures raised while a cycle is executing are modelled
/// separately by [`AttemptError`](crate::models::failure::AttemptError).
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Persistence failure when interacting with `SQLite`.
    Db(String),
    /// Observer channel (WebSocket) failure.
    Channel(String),
    /// IPC communication failure.
    Ipc(String),
    /// Automation driver failure reported by an environment.
    Driver(String),
    /// Flow definition is malformed or references unknown data.
    Flow(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Db(msg) => write!(f, "db: {msg}"),
            Self::Channel(msg) => write!(f, "channel: {msg}"),
            Self::Ipc(msg) => write!(f, "ipc: {msg}"),
            Self::Driver(msg) => write!(f, "driver: {msg}"),
            Self::Flow(msg) => write!(f, "flow: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
