//! Manual-input pause points.
//!
//! A step calls [`PauseCoordinator::request_input`] to suspend until the
//! operator supplies a value over the observer channel. The coordinator holds
//! at most one outstanding request. Responses arrive from transport tasks
//! through [`PauseCoordinator::submit_response`]; the slot is only touched
//! under its mutex, so creation, resolution, timeout, and cancellation
//! cannot interleave.

use std::fmt::{Display, Formatter};
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::models::event::{CancelReason, ObserverEvent};
use crate::models::failure::{AttemptError, FailureKind};
use crate::observer::ObserverHub;

/// Why a pause point returned without a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PauseError {
    /// The kind tag was blank.
    EmptyKind,
    /// Another request is still outstanding.
    AlreadyPending {
        /// Kind of the request already waiting.
        kind: String,
    },
    /// The wait budget elapsed.
    TimedOut {
        /// Kind of the expired request.
        kind: String,
        /// Budget that elapsed.
        after: Duration,
    },
    /// The request was cancelled before a value arrived.
    Cancelled {
        /// Kind of the cancelled request.
        kind: String,
        /// What cancelled it.
        reason: CancelReason,
    },
}

impl Display for PauseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyKind => write!(f, "manual input kind must not be empty"),
            Self::AlreadyPending { kind } => {
                write!(f, "a manual input request for '{kind}' is already pending")
            }
            Self::TimedOut { kind, after } => write!(
                f,
                "no '{kind}' input received within {}s",
                after.as_secs()
            ),
            Self::Cancelled { kind, reason } => {
                write!(f, "'{kind}' input request cancelled: {reason:?}")
            }
        }
    }
}

impl std::error::Error for PauseError {}

impl From<PauseError> for AttemptError {
    fn from(err: PauseError) -> Self {
        let kind = match &err {
            PauseError::TimedOut { .. }
            | PauseError::Cancelled {
                reason: CancelReason::TimedOut | CancelReason::ChannelLost,
                ..
            } => FailureKind::ManualInputNeverArrived,
            PauseError::Cancelled { .. } => FailureKind::Cancelled,
            PauseError::EmptyKind | PauseError::AlreadyPending { .. } => FailureKind::DriverFault,
        };
        Self::new(kind, err.to_string())
    }
}

/// How a pending request was closed.
#[derive(Debug)]
enum Resolution {
    Value(String),
    Cancelled(CancelReason),
}

struct PendingRequest {
    id: String,
    kind: String,
    tx: oneshot::Sender<Resolution>,
}

/// Public view of the outstanding request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInfo {
    /// Correlation identifier.
    pub request_id: String,
    /// Kind tag.
    pub kind: String,
}

/// Result of delivering an operator response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The pending request was resolved.
    Delivered {
        /// Request that received the value.
        request_id: String,
        /// Its kind tag.
        kind: String,
    },
    /// Nothing was waiting; the value was discarded.
    NoPendingRequest,
    /// The response named a different request; the value was discarded.
    Stale {
        /// Identifier the response carried.
        request_id: String,
    },
}

/// Single-slot rendezvous between the running flow and the operator.
pub struct PauseCoordinator {
    slot: Mutex<Option<PendingRequest>>,
    hub: ObserverHub,
}

impl PauseCoordinator {
    /// Create a coordinator that announces requests on `hub`.
    #[must_use]
    pub fn new(hub: ObserverHub) -> Self {
        Self {
            slot: Mutex::new(None),
            hub,
        }
    }

    /// Suspend until the operator supplies a value for `kind`.
    ///
    /// Emits `manual_input_requested` and blocks until a matching response,
    /// a cancellation, or `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`PauseError::AlreadyPending`] if a request is outstanding,
    /// [`PauseError::TimedOut`] when the budget elapses, and
    /// [`PauseError::Cancelled`] when the request is cancelled.
    pub async fn request_input(&self, kind: &str, timeout: Duration) -> Result<String, PauseError> {
        let kind = kind.trim();
        if kind.is_empty() {
            return Err(PauseError::EmptyKind);
        }

        let request_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        {
            let mut slot = self.slot.lock().await;
            if let Some(ref existing) = *slot {
                if existing.tx.is_closed() {
                    warn!(request_id = %existing.id, "dropping abandoned manual input request");
                    self.announce_closed(&existing.id, &existing.kind, CancelReason::TimedOut);
                    slot.take();
                }
            }
            if let Some(ref existing) = *slot {
                warn!(
                    pending_kind = %existing.kind,
                    requested_kind = kind,
                    "rejecting concurrent manual input request"
                );
                return Err(PauseError::AlreadyPending {
                    kind: existing.kind.clone(),
                });
            }
            *slot = Some(PendingRequest {
                id: request_id.clone(),
                kind: kind.to_owned(),
                tx,
            });
        }

        let span = info_span!("manual_input", request_id = %request_id, kind);
        async move {
            self.hub
                .warn(format!("waiting for operator input: {}", kind.to_uppercase()));
            self.hub.emit(ObserverEvent::ManualInputRequested {
                request_id: request_id.clone(),
                kind: kind.to_owned(),
            });

            match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(Resolution::Value(value))) => {
                    info!("manual input delivered");
                    Ok(value)
                }
                Ok(Ok(Resolution::Cancelled(reason))) => Err(PauseError::Cancelled {
                    kind: kind.to_owned(),
                    reason,
                }),
                // Sender dropped without resolving; only happens if the slot
                // was replaced, which the mutex prevents.
                Ok(Err(_)) => Err(PauseError::Cancelled {
                    kind: kind.to_owned(),
                    reason: CancelReason::Shutdown,
                }),
                Err(_elapsed) => {
                    let cleared = self.clear_if_current(&request_id).await;
                    if cleared {
                        self.announce_closed(&request_id, kind, CancelReason::TimedOut);
                    }
                    warn!(timeout_secs = timeout.as_secs(), "manual input timed out");
                    Err(PauseError::TimedOut {
                        kind: kind.to_owned(),
                        after: timeout,
                    })
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Deliver an operator value to the pending request.
    ///
    /// When `request_id` is given it must match the outstanding request;
    /// otherwise the value is treated as stale. With no request pending the
    /// value is discarded and logged, as it is when the waiting step has
    /// already given up.
    pub async fn submit_response(&self, value: String, request_id: Option<&str>) -> SubmitOutcome {
        let pending = {
            let mut slot = self.slot.lock().await;
            let stale = match (slot.as_ref(), request_id) {
                (Some(current), Some(id)) if current.id != id => Some(current.id.clone()),
                _ => None,
            };
            if let Some(pending_id) = stale {
                let id = request_id.unwrap_or_default();
                warn!(
                    request_id = id,
                    %pending_id,
                    "discarding manual response for a stale request"
                );
                self.hub
                    .warn("discarded manual input addressed to an expired request");
                return SubmitOutcome::Stale {
                    request_id: id.to_owned(),
                };
            }
            slot.take()
        };

        let Some(pending) = pending else {
            warn!("manual response received with no pending request");
            self.hub
                .warn("received manual input but nothing is waiting for it");
            return SubmitOutcome::NoPendingRequest;
        };

        if pending.tx.send(Resolution::Value(value)).is_err() {
            warn!(request_id = %pending.id, "manual input arrived after the request expired");
            self.announce_closed(&pending.id, &pending.kind, CancelReason::TimedOut);
            self.hub
                .warn("discarded manual input; the request had already expired");
            return SubmitOutcome::NoPendingRequest;
        }
        self.hub
            .success(format!("received manual input for {}", pending.kind));

        SubmitOutcome::Delivered {
            request_id: pending.id,
            kind: pending.kind,
        }
    }

    /// Cancel the outstanding request, if any. Returns whether one existed.
    pub async fn cancel_pending(&self, reason: CancelReason) -> bool {
        let pending = self.slot.lock().await.take();
        let Some(pending) = pending else {
            return false;
        };

        info!(request_id = %pending.id, kind = %pending.kind, ?reason, "cancelling manual input request");
        self.announce_closed(&pending.id, &pending.kind, reason);
        let _ = pending.tx.send(Resolution::Cancelled(reason));
        true
    }

    /// The outstanding request, if any.
    pub async fn pending(&self) -> Option<PendingInfo> {
        self.slot.lock().await.as_ref().map(|pending| PendingInfo {
            request_id: pending.id.clone(),
            kind: pending.kind.clone(),
        })
    }

    async fn clear_if_current(&self, request_id: &str) -> bool {
        let mut slot = self.slot.lock().await;
        if slot.as_ref().is_some_and(|pending| pending.id == request_id) {
            slot.take();
            true
        } else {
            false
        }
    }

    fn announce_closed(&self, request_id: &str, kind: &str, reason: CancelReason) {
        self.hub.emit(ObserverEvent::ManualInputClosed {
            request_id: request_id.to_owned(),
            kind: kind.to_owned(),
            reason,
        });
    }
}
