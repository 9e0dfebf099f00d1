//! WebSocket transport for the observer channel.
//!
//! `GET /ws` upgrades to a bidirectional JSON stream: every [`ObserverEvent`]
//! is pushed to each connected dashboard and inbound text frames are parsed
//! as [`OperatorCommand`]s. `GET /health` reports liveness.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::models::event::{CancelReason, LogLevel, ObserverEvent, OperatorCommand};
use crate::state::AppState;
use crate::{AppError, Result};

/// Router state: application state plus the shutdown signal for open sockets.
#[derive(Clone)]
struct ObserverState {
    app: Arc<AppState>,
    shutdown: CancellationToken,
}

/// Build the observer router.
#[must_use]
pub fn router(app: Arc<AppState>, shutdown: CancellationToken) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .with_state(ObserverState { app, shutdown })
}

/// Bind the configured address and serve until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Channel` if the listener cannot be bound or the
/// server fails.
pub async fn serve_observer(app: Arc<AppState>, ct: CancellationToken) -> Result<()> {
    let bind = format!("{}:{}", app.config.bind_address, app.config.http_port);
    let listener = TcpListener::bind(&bind)
        .await
        .map_err(|err| AppError::Channel(format!("failed to bind observer on {bind}: {err}")))?;
    serve(listener, app, ct).await
}

/// Serve the observer router on an already-bound listener.
///
/// # Errors
///
/// Returns `AppError::Channel` if the server fails.
pub async fn serve(listener: TcpListener, app: Arc<AppState>, ct: CancellationToken) -> Result<()> {
    let addr: Option<SocketAddr> = listener.local_addr().ok();
    info!(?addr, "observer channel listening");

    let shutdown = ct.clone();
    axum::serve(listener, router(app, ct))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|err| AppError::Channel(format!("observer server error: {err}")))?;

    info!("observer channel shut down");
    Ok(())
}

async fn health(State(state): State<ObserverState>) -> Response {
    Json(serde_json::json!({
        "status": "ok",
        "running": state.app.scheduler.is_running(),
    }))
    .into_response()
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ObserverState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.app, state.shutdown))
}

type Sink = SplitSink<WebSocket, Message>;

async fn handle_socket(socket: WebSocket, app: Arc<AppState>, shutdown: CancellationToken) {
    let connections = app.hub.connection_opened();
    let span = info_span!("dashboard", connections);

    async move {
        info!("dashboard connected");
        // Subscribe before the replay so nothing emitted in between is lost.
        let mut events = app.hub.subscribe();
        let (mut sink, mut stream) = socket.split();

        if replay(&mut sink, &app).await.is_ok() {
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                    event = events.recv() => match event {
                        Ok(event) => {
                            if send_event(&mut sink, &event).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "dashboard lagging; events dropped");
                        }
                        Err(RecvError::Closed) => break,
                    },
                    frame = stream.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            if let Some(reply) = handle_command(&app, text.as_str()).await {
                                if send_event(&mut sink, &reply).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            warn!(%err, "dashboard read error");
                            break;
                        }
                    },
                }
            }
        }

        let remaining = app.hub.connection_closed();
        info!(remaining, "dashboard disconnected");
        if remaining == 0 && app.pause.cancel_pending(CancelReason::ChannelLost).await {
            app.hub
                .warn("last dashboard disconnected; pending manual input cancelled");
        }
    }
    .instrument(span)
    .await;
}

/// Bring a new dashboard up to date: current status and any pending request.
async fn replay(sink: &mut Sink, app: &AppState) -> std::result::Result<(), axum::Error> {
    send_event(
        sink,
        &ObserverEvent::Status {
            state: app.hub.current_status(),
            message: None,
        },
    )
    .await?;

    if let Some(pending) = app.pause.pending().await {
        send_event(
            sink,
            &ObserverEvent::ManualInputRequested {
                request_id: pending.request_id,
                kind: pending.kind,
            },
        )
        .await?;
    }
    Ok(())
}

/// Apply one inbound frame. Returns an event for this dashboard only when the
/// command was rejected.
async fn handle_command(app: &AppState, raw: &str) -> Option<ObserverEvent> {
    let command = match serde_json::from_str::<OperatorCommand>(raw) {
        Ok(command) => command,
        Err(err) => {
            warn!(%err, "unparseable dashboard command");
            return Some(ObserverEvent::Log {
                level: LogLevel::Error,
                message: format!("invalid command: {err}"),
            });
        }
    };

    match app.apply(command).await {
        Ok(_) => None,
        Err(err) => Some(ObserverEvent::Log {
            level: LogLevel::Error,
            message: err.to_string(),
        }),
    }
}

async fn send_event(sink: &mut Sink, event: &ObserverEvent) -> std::result::Result<(), axum::Error> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(err) => {
            warn!(%err, "failed to serialize observer event");
            return Ok(());
        }
    };
    sink.send(Message::Text(text.into())).await
}
