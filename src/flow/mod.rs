//! Declarative step lists executed once per attempt.
//!
//! Site-specific glue lives in configuration rather than code:
//!
//! ```toml
//! [[flow.steps]]
//! name = "open form"
//! action = "navigate"
//! url = "https://forms.example.test/register"
//!
//! [[flow.steps]]
//! name = "verification code"
//! action = "fill"
//! selector = "input[name=code]"
//! value = { from = "manual", kind = "otp" }
//! when_state = "awaiting_input"
//! ```

pub mod executor;

use serde::Deserialize;

use crate::models::identity::IdentityField;
use crate::models::page_state::PageState;
use crate::{AppError, Result};

/// Where a `fill` step takes its text from.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "from", rename_all = "snake_case")]
pub enum ValueSource {
    /// A fixed string.
    Literal {
        /// Text to type.
        value: String,
    },
    /// A field of the attempt's generated identity.
    Identity {
        /// Field to read.
        field: IdentityField,
    },
    /// Operator-supplied text; suspends the flow until it arrives.
    Manual {
        /// Kind tag shown to the operator, e.g. `phone`.
        kind: String,
    },
}

/// One logical form action.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StepAction {
    /// Load a URL.
    Navigate {
        /// Destination.
        url: String,
    },
    /// Replace an input's value.
    Fill {
        /// Target element.
        selector: String,
        /// Text source.
        value: ValueSource,
    },
    /// Click an element.
    Click {
        /// Target element.
        selector: String,
    },
    /// Wait until an element becomes visible.
    WaitFor {
        /// Target element.
        selector: String,
        /// Overrides the configured step budget.
        #[serde(default)]
        timeout_seconds: Option<u64>,
    },
    /// Idle for a fixed time.
    Delay {
        /// Milliseconds to wait.
        ms: u64,
    },
    /// Emit a labeled snapshot.
    Snapshot {
        /// Checkpoint label.
        label: String,
    },
    /// Require the page to be in one of the listed states.
    ExpectState {
        /// Accepted states.
        any_of: Vec<PageState>,
    },
}

/// A named step with optional guards.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct StepSpec {
    /// Name shown in logs.
    pub name: String,
    /// What the step does.
    #[serde(flatten)]
    pub action: StepAction,
    /// Run only when the observed page state matches.
    #[serde(default)]
    pub when_state: Option<PageState>,
    /// Run only when the run configuration sets this flag.
    #[serde(default)]
    pub when_flag: Option<String>,
    /// Emit a labeled snapshot after the step succeeds.
    #[serde(default)]
    pub snapshot_after: Option<String>,
}

/// Ordered steps executed in every attempt.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct FlowDefinition {
    /// Steps in execution order.
    #[serde(default)]
    pub steps: Vec<StepSpec>,
}

impl FlowDefinition {
    /// Check the definition for empty steps and blank references.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Flow` naming the first offending step.
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(AppError::Flow("flow must contain at least one step".into()));
        }

        for (position, step) in self.steps.iter().enumerate() {
            if step.name.trim().is_empty() {
                return Err(AppError::Flow(format!("step {position} has an empty name")));
            }

            let problem = match &step.action {
                StepAction::Navigate { url } if url.trim().is_empty() => Some("empty url"),
                StepAction::Fill { selector, .. }
                | StepAction::Click { selector }
                | StepAction::WaitFor { selector, .. }
                    if selector.trim().is_empty() =>
                {
                    Some("empty selector")
                }
                StepAction::Fill {
                    value: ValueSource::Manual { kind },
                    ..
                } if kind.trim().is_empty() => Some("empty manual input kind"),
                StepAction::Snapshot { label } if label.trim().is_empty() => Some("empty label"),
                StepAction::ExpectState { any_of } if any_of.is_empty() => {
                    Some("expect_state needs at least one state")
                }
                _ => None,
            };

            if let Some(problem) = problem {
                return Err(AppError::Flow(format!("step '{}': {problem}", step.name)));
            }
        }

        Ok(())
    }

    /// Number of steps that can suspend for operator input.
    #[must_use]
    pub fn pause_points(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| {
                matches!(
                    step.action,
                    StepAction::Fill {
                        value: ValueSource::Manual { .. },
                        ..
                    }
                )
            })
            .count()
    }
}
