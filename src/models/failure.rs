//! Attempt failure taxonomy.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Named reasons an attempt can stop early.
///
/// All kinds are local to the current cycle; none of them stops the run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The isolated environment could not be created.
    EnvironmentAcquisitionFailure,
    /// A step exceeded its wait budget.
    StepTimeout,
    /// The target rejected the attempt or showed an unexpected page.
    UnexpectedPageState,
    /// An expected interactive element never appeared.
    InputMissing,
    /// A manual-input request timed out or was cancelled by channel loss.
    ManualInputNeverArrived,
    /// No identity could be produced for the attempt.
    IdentityUnavailable,
    /// The operator stopped the run while the attempt was in flight.
    Cancelled,
    /// Any other driver error or an unexpected fault inside a step.
    DriverFault,
}

impl FailureKind {
    /// Stable snake-case tag used in persistence and observer events.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EnvironmentAcquisitionFailure => "environment_acquisition_failure",
            Self::StepTimeout => "step_timeout",
            Self::UnexpectedPageState => "unexpected_page_state",
            Self::InputMissing => "input_missing",
            Self::ManualInputNeverArrived => "manual_input_never_arrived",
            Self::IdentityUnavailable => "identity_unavailable",
            Self::Cancelled => "cancelled",
            Self::DriverFault => "driver_fault",
        }
    }

    /// Parse a tag produced by [`as_str`](Self::as_str).
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        let kind = match tag {
            "environment_acquisition_failure" => Self::EnvironmentAcquisitionFailure,
            "step_timeout" => Self::StepTimeout,
            "unexpected_page_state" => Self::UnexpectedPageState,
            "input_missing" => Self::InputMissing,
            "manual_input_never_arrived" => Self::ManualInputNeverArrived,
            "identity_unavailable" => Self::IdentityUnavailable,
            "cancelled" => Self::Cancelled,
            "driver_fault" => Self::DriverFault,
            _ => return None,
        };
        Some(kind)
    }
}

impl Display for FailureKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure raised while executing one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptError {
    /// Failure classification.
    pub kind: FailureKind,
    /// Context for logs; never parsed.
    pub detail: String,
}

impl AttemptError {
    /// Construct a new attempt error.
    #[must_use]
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

impl Display for AttemptError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

impl std::error::Error for AttemptError {}

impl From<crate::AppError> for AttemptError {
    fn from(err: crate::AppError) -> Self {
        Self::new(FailureKind::DriverFault, err.to_string())
    }
}

/// Final result of one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Every step ran to completion.
    Completed,
    /// The attempt stopped with a classified failure.
    Failed(AttemptError),
}

impl AttemptOutcome {
    /// Whether the attempt finished every step.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Failure kind, if the attempt failed.
    #[must_use]
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Completed => None,
            Self::Failed(err) => Some(err.kind),
        }
    }
}
