//! Observer channel: outbound event fan-out and dashboard transports.
//!
//! [`ObserverHub`] is the single emission point for progress lines, frames,
//! and pause signals. Transports (WebSocket, IPC) subscribe to it; the core
//! never talks to a socket directly.

pub mod ws;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};

use crate::models::event::{LogLevel, ObserverEvent, RunStatus};

/// Events buffered per subscriber before slow dashboards start lagging.
const DEFAULT_CAPACITY: usize = 256;

/// Cloneable handle for emitting observer events.
#[derive(Clone)]
pub struct ObserverHub {
    tx: broadcast::Sender<ObserverEvent>,
    status: Arc<watch::Sender<RunStatus>>,
    connections: Arc<AtomicUsize>,
}

impl Default for ObserverHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ObserverHub {
    /// Create a hub buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        let (status, _) = watch::channel(RunStatus::Idle);
        Self {
            tx,
            status: Arc::new(status),
            connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Subscribe to all future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ObserverEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to every subscriber. Having no subscribers is not an error.
    pub fn emit(&self, event: ObserverEvent) {
        let _ = self.tx.send(event);
    }

    /// Emit a progress line and mirror it to `tracing`.
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Info | LogLevel::Success => info!(target: "observer", "{message}"),
            LogLevel::Warn => warn!(target: "observer", "{message}"),
            LogLevel::Error => error!(target: "observer", "{message}"),
        }
        self.emit(ObserverEvent::Log { level, message });
    }

    /// Emit an informational progress line.
    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    /// Emit a warning progress line.
    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message);
    }

    /// Emit an error progress line.
    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    /// Emit a milestone progress line.
    pub fn success(&self, message: impl Into<String>) {
        self.log(LogLevel::Success, message);
    }

    /// Record and broadcast a scheduler state change.
    pub fn status(&self, state: RunStatus, message: Option<String>) {
        self.status.send_replace(state);
        self.emit(ObserverEvent::Status { state, message });
    }

    /// Most recent scheduler state.
    #[must_use]
    pub fn current_status(&self) -> RunStatus {
        *self.status.borrow()
    }

    /// Broadcast a periodic preview frame.
    pub fn preview(&self, jpeg: &[u8]) {
        self.emit(ObserverEvent::Preview {
            image: STANDARD.encode(jpeg),
        });
    }

    /// Broadcast a labeled checkpoint frame.
    pub fn snapshot(&self, label: &str, jpeg: &[u8]) {
        self.info(format!("snapshot: {label}"));
        self.emit(ObserverEvent::Snapshot {
            label: label.to_owned(),
            image: STANDARD.encode(jpeg),
        });
    }

    /// Register a dashboard connection; returns the new count.
    pub fn connection_opened(&self) -> usize {
        self.connections.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Unregister a dashboard connection; returns the remaining count.
    pub fn connection_closed(&self) -> usize {
        let previous = self
            .connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                Some(count.saturating_sub(1))
            })
            .unwrap_or(0);
        previous.saturating_sub(1)
    }

    /// Number of connected dashboards.
    #[must_use]
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}
