#![forbid(unsafe_code)]

//! `form-pilot-ctl`: local CLI companion for `form-pilot`.
//!
//! Connects to the IPC socket and sends JSON commands to the server, so an
//! operator at the machine can drive a run without the dashboard.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use interprocess::local_socket::{traits::Stream as _, GenericNamespaced, Stream, ToNsName};

#[derive(Debug, Parser)]
#[command(
    name = "form-pilot-ctl",
    about = "Local CLI for the form-pilot server",
    version,
    long_about = None
)]
struct Cli {
    /// IPC socket name (must match server's `ipc_name` config).
    #[arg(long, default_value = "form-pilot")]
    ipc_name: String,

    /// Shared secret expected by the server.
    #[arg(long, env = "FORM_PILOT_IPC_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show scheduler status, the pending request, and attempt totals.
    Status,

    /// Start a run from a TOML or JSON run configuration file.
    Start {
        /// Path to the run configuration.
        file: PathBuf,
    },

    /// Request a cooperative stop of the active run.
    Stop,

    /// Answer the pending manual-input request.
    Respond {
        /// Value to deliver.
        value: String,
        /// Request identifier; omitted answers whatever is pending.
        #[arg(long)]
        id: Option<String>,
    },
}

fn main() -> ExitCode {
    let args = Cli::parse();

    let mut request = match build_request(&args.command) {
        Ok(request) => request,
        Err(err) => {
            eprintln!("Error: {err}");
            return ExitCode::from(2);
        }
    };
    if let Some(token) = args.token {
        request["auth_token"] = serde_json::Value::String(token);
    }

    match send_ipc_command(&args.ipc_name, &request) {
        Ok(response) => render(&response),
        Err(err) => {
            eprintln!("Cannot reach form-pilot on '{}': {err}", args.ipc_name);
            ExitCode::FAILURE
        }
    }
}

/// Print the server reply; failures go to stderr with a non-zero exit.
fn render(response: &serde_json::Value) -> ExitCode {
    if response["ok"].as_bool() == Some(true) {
        match response.get("data") {
            Some(data) => println!(
                "{}",
                serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string())
            ),
            None => println!("OK"),
        }
        ExitCode::SUCCESS
    } else {
        let message = response["error"].as_str().unwrap_or("unknown error");
        eprintln!("Error: {message}");
        ExitCode::FAILURE
    }
}

fn build_request(
    command: &Command,
) -> std::result::Result<serde_json::Value, Box<dyn std::error::Error>> {
    Ok(match command {
        Command::Status => serde_json::json!({ "command": "status" }),
        Command::Start { file } => {
            serde_json::json!({ "command": "start", "config": read_run_config(file)? })
        }
        Command::Stop => serde_json::json!({ "command": "stop" }),
        Command::Respond { value, id } => {
            let mut req = serde_json::json!({ "command": "respond", "value": value });
            if let Some(id) = id {
                req["id"] = serde_json::Value::String(id.clone());
            }
            req
        }
    })
}

/// Load a run configuration file; `.json` is parsed as JSON, anything else as TOML.
fn read_run_config(
    path: &Path,
) -> std::result::Result<serde_json::Value, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        Ok(serde_json::from_str(&raw)?)
    } else {
        let value: toml::Value = toml::from_str(&raw)?;
        Ok(serde_json::to_value(value)?)
    }
}

/// Connect to the IPC socket, send a JSON command, and read the response.
fn send_ipc_command(
    ipc_name: &str,
    request: &serde_json::Value,
) -> std::result::Result<serde_json::Value, Box<dyn std::error::Error>> {
    let name = ipc_name.to_ns_name::<GenericNamespaced>()?;
    let mut stream = Stream::connect(name)?;

    let mut request_line = serde_json::to_string(request)?;
    request_line.push('\n');
    stream.write_all(request_line.as_bytes())?;
    stream.flush()?;

    let mut reader = BufReader::new(&stream);
    let mut response_line = String::new();
    reader.read_line(&mut response_line)?;

    let response: serde_json::Value = serde_json::from_str(response_line.trim())?;
    Ok(response)
}
