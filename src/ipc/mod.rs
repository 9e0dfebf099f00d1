//! Local IPC layer for `form-pilot-ctl` interaction.
//!
//! Provides a named pipe (Windows) or Unix domain socket (Linux/macOS)
//! server that accepts JSON-line commands from the companion CLI.

pub mod server;

/// Environment variable holding the shared IPC secret.
pub const IPC_TOKEN_ENV: &str = "FORM_PILOT_IPC_TOKEN";
