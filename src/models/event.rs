//! Observer channel wire messages.
//!
//! Outbound events are tagged by `event`, inbound commands by `command`:
//!
//! ```json
//! {"event": "log", "level": "info", "message": "cycle 1 started"}
//! {"event": "manual_input_requested", "request_id": "…", "kind": "otp"}
//! {"command": "manual_response", "value": "123456"}
//! ```

use serde::{Deserialize, Serialize};

use super::run::RunConfiguration;

/// Severity tag attached to log events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Routine progress.
    Info,
    /// Something notable that did not stop the attempt.
    Warn,
    /// A failure.
    Error,
    /// A milestone was reached.
    Success,
}

/// Coarse scheduler state reported to dashboards.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// No run is active.
    Idle,
    /// A run is iterating attempt contexts.
    Running,
    /// The run exhausted its attempt contexts.
    Completed,
    /// The run ended because of a stop request.
    Stopped,
    /// The run aborted on a fatal error.
    Failed,
}

/// Why a pending manual-input request closed without a value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// The wait budget elapsed.
    TimedOut,
    /// The last dashboard disconnected.
    ChannelLost,
    /// The operator stopped the run.
    StopRequested,
    /// The server is shutting down.
    Shutdown,
}

/// Core → observer events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ObserverEvent {
    /// Human-readable progress line.
    Log {
        /// Severity tag.
        level: LogLevel,
        /// Message text.
        message: String,
    },
    /// Scheduler state change.
    Status {
        /// New state.
        state: RunStatus,
        /// Optional detail.
        #[serde(skip_serializing_if = "Option::is_none", default)]
        message: Option<String>,
    },
    /// Periodic low-fidelity frame, base64 JPEG.
    Preview {
        /// Encoded image.
        image: String,
    },
    /// Checkpoint frame, base64 JPEG.
    Snapshot {
        /// Checkpoint label.
        label: String,
        /// Encoded image.
        image: String,
    },
    /// The flow is suspended until the operator supplies a value.
    ManualInputRequested {
        /// Correlation identifier for the response.
        request_id: String,
        /// What is being asked for, e.g. `phone` or `otp`.
        kind: String,
    },
    /// A pending request closed without a value.
    ManualInputClosed {
        /// Correlation identifier of the closed request.
        request_id: String,
        /// Kind tag of the closed request.
        kind: String,
        /// Why it closed.
        reason: CancelReason,
    },
}

/// Observer → core commands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum OperatorCommand {
    /// Begin a scheduler run.
    Start {
        /// Operator settings for the run.
        config: RunConfiguration,
    },
    /// Cooperative stop request.
    Stop,
    /// Value for the pending manual-input request.
    ManualResponse {
        /// Supplied value.
        value: String,
        /// Request the value answers; omitted by simple dashboards.
        #[serde(default)]
        request_id: Option<String>,
    },
}
