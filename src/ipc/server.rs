//! Local IPC server for `form-pilot-ctl` commands.
//!
//! Listens on a named pipe (Windows) or Unix domain socket (Linux/macOS)
//! using the `interprocess` crate. Accepts line-delimited JSON commands
//! and routes them through [`AppState::apply`].
//!
//! ## Protocol
//!
//! Request (one JSON object per line):
//! ```json
//! {"command": "status"}
//! {"command": "start", "config": {"credential": "…", "mode": "random"}}
//! {"command": "stop"}
//! {"command": "respond", "value": "123456", "id": "…"}
//! ```
//!
//! Response (one JSON object per line):
//! ```json
//! {"ok": true, "data": { ... } }
//! {"ok": false, "error": "unauthorized"}
//! ```

use std::sync::Arc;

use interprocess::local_socket::{tokio::prelude::*, GenericNamespaced, ListenerOptions};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::models::event::OperatorCommand;
use crate::models::run::RunConfiguration;
use crate::state::AppState;
use crate::{AppError, Result};

/// Inbound IPC request from `form-pilot-ctl`.
#[derive(Debug, Deserialize)]
struct IpcRequest {
    /// Command verb.
    command: String,
    /// Run settings (for `start`).
    config: Option<RunConfiguration>,
    /// Manual value (for `respond`).
    value: Option<String>,
    /// Pending request identifier (for `respond`).
    id: Option<String>,
    /// Shared-secret authentication token.
    auth_token: Option<String>,
}

/// Outbound IPC response to `form-pilot-ctl`.
#[derive(Debug, Serialize)]
struct IpcResponse {
    /// Whether the command succeeded.
    ok: bool,
    /// Payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
    /// Error message on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl IpcResponse {
    fn success(data: serde_json::Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Bind the configured local socket and accept `form-pilot-ctl` clients on a
/// background task until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Ipc` if the socket name is invalid or already bound.
pub fn spawn_ipc_server(
    state: Arc<AppState>,
    ct: CancellationToken,
) -> Result<tokio::task::JoinHandle<()>> {
    let ipc_name = state.config.ipc_name.clone();
    let socket_name = ipc_name
        .as_str()
        .to_ns_name::<GenericNamespaced>()
        .map_err(|err| AppError::Ipc(format!("invalid ipc socket name '{ipc_name}': {err}")))?;
    let listener = ListenerOptions::new()
        .name(socket_name)
        .create_tokio()
        .map_err(|err| AppError::Ipc(format!("cannot listen on '{ipc_name}': {err}")))?;

    info!(%ipc_name, "ctl socket listening");
    let span = info_span!("ipc_server", %ipc_name);
    Ok(tokio::spawn(accept_loop(listener, state, ct).instrument(span)))
}

async fn accept_loop(
    listener: interprocess::local_socket::tokio::Listener,
    state: Arc<AppState>,
    ct: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            () = ct.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok(stream) => {
                tokio::spawn(handle_connection(stream, Arc::clone(&state)));
            }
            Err(err) => warn!(%err, "ctl accept failed"),
        }
    }
    info!("ctl socket closed");
}

/// Serve one `form-pilot-ctl` connection until it hangs up.
async fn handle_connection(
    stream: interprocess::local_socket::tokio::Stream,
    state: Arc<AppState>,
) {
    async move {
        let (reader, mut writer) = stream.split();
        let mut lines = BufReader::new(reader).lines();

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(err) => {
                    warn!(%err, "ctl read failed");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            let mut reply = dispatch_line(&state, line.trim()).await;
            reply.push('\n');
            if let Err(err) = writer.write_all(reply.as_bytes()).await {
                warn!(%err, "ctl write failed");
                break;
            }
        }

        debug!("ctl disconnected");
    }
    .instrument(info_span!("ctl_client"))
    .await;
}

/// Parse, authorize, and execute one request line; returns the JSON response.
pub async fn dispatch_line(state: &AppState, line: &str) -> String {
    let response = match serde_json::from_str::<IpcRequest>(line) {
        Ok(request) => dispatch_command(request, state).await,
        Err(err) => IpcResponse::error(format!("invalid json: {err}")),
    };

    serde_json::to_string(&response)
        .unwrap_or_else(|_| r#"{"ok":false,"error":"serialization failed"}"#.to_owned())
}

/// Route an IPC command to the shared command dispatcher.
async fn dispatch_command(request: IpcRequest, state: &AppState) -> IpcResponse {
    let span = info_span!("ipc_command", command = %request.command);

    async move {
        if let Some(ref expected) = state.ipc_auth_token {
            match request.auth_token {
                Some(ref provided) if provided == expected => {}
                _ => {
                    warn!("IPC request rejected: invalid auth token");
                    return IpcResponse::error("unauthorized");
                }
            }
        }

        let command = match request.command.as_str() {
            "status" => {
                return match state.status_snapshot().await {
                    Ok(data) => IpcResponse::success(data),
                    Err(err) => IpcResponse::error(format!("failed to read status: {err}")),
                };
            }
            "start" => {
                let Some(config) = request.config else {
                    return IpcResponse::error("missing required 'config' field");
                };
                OperatorCommand::Start { config }
            }
            "stop" => OperatorCommand::Stop,
            "respond" => {
                let Some(value) = request.value else {
                    return IpcResponse::error("missing required 'value' field");
                };
                OperatorCommand::ManualResponse {
                    value,
                    request_id: request.id,
                }
            }
            other => return IpcResponse::error(format!("unknown command: {other}")),
        };

        match state.apply(command).await {
            Ok(data) => IpcResponse::success(data),
            Err(err) => IpcResponse::error(err.to_string()),
        }
    }
    .instrument(span)
    .await
}
