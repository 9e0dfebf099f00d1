//! Step execution against one environment.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, info_span, Instrument};

use super::{StepAction, StepSpec, ValueSource};
use crate::driver::Environment;
use crate::models::failure::{AttemptError, FailureKind};
use crate::models::identity::Identity;
use crate::models::page_state::PageState;
use crate::models::run::RunConfiguration;
use crate::observer::ObserverHub;
use crate::orchestrator::pause::PauseCoordinator;

/// Everything a step needs while it runs.
pub struct StepContext<'a> {
    /// Environment acquired for the attempt.
    pub env: &'a dyn Environment,
    /// Identity generated for the attempt.
    pub identity: &'a Identity,
    /// Operator settings for the run.
    pub config: &'a RunConfiguration,
    /// Pause point for operator-supplied values.
    pub pause: &'a PauseCoordinator,
    /// Progress and snapshot sink.
    pub hub: &'a ObserverHub,
    /// Wait budget per driver call.
    pub step_timeout: Duration,
    /// Wait budget per manual-input request.
    pub manual_input_timeout: Duration,
    /// JPEG quality for labeled snapshots.
    pub snapshot_quality: u8,
}

/// Whether a step did anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDisposition {
    /// The action ran.
    Ran,
    /// A guard did not match; nothing happened.
    Skipped,
}

/// Run one step, honoring its guards.
///
/// # Errors
///
/// Returns a classified [`AttemptError`] if the step fails; the caller ends
/// the attempt.
pub async fn execute_step(
    step: &StepSpec,
    ctx: &StepContext<'_>,
) -> Result<StepDisposition, AttemptError> {
    let span = info_span!("step", name = %step.name);
    async move {
        if let Some(ref flag) = step.when_flag {
            if !ctx.config.flag(flag) {
                debug!(flag, "flag not set; skipping step");
                return Ok(StepDisposition::Skipped);
            }
        }

        if let Some(expected) = step.when_state {
            let observed = bounded(ctx, "observe page state", ctx.env.observe_page_state()).await?;
            if observed != expected {
                debug!(?expected, ?observed, "page state guard not met; skipping step");
                return Ok(StepDisposition::Skipped);
            }
        }

        run_action(&step.action, ctx).await?;

        if let Some(ref label) = step.snapshot_after {
            capture_snapshot(ctx.env, ctx.hub, label, ctx.snapshot_quality).await;
        }

        Ok(StepDisposition::Ran)
    }
    .instrument(span)
    .await
}

async fn run_action(action: &StepAction, ctx: &StepContext<'_>) -> Result<(), AttemptError> {
    match action {
        StepAction::Navigate { url } => {
            bounded(ctx, "navigate", ctx.env.navigate(url)).await?;
        }
        StepAction::Fill { selector, value } => {
            let text = resolve_value(value, ctx).await?;
            if let ValueSource::Manual { kind } = value {
                ctx.hub.info(format!("filling {kind}"));
            }
            bounded(ctx, "fill", ctx.env.fill(selector, &text)).await?;
        }
        StepAction::Click { selector } => {
            bounded(ctx, "click", ctx.env.click(selector)).await?;
        }
        StepAction::WaitFor {
            selector,
            timeout_seconds,
        } => {
            let budget = timeout_seconds.map_or(ctx.step_timeout, Duration::from_secs);
            // The driver owns the element wait; the outer bound only guards a
            // driver that ignores its own budget.
            let appeared = match tokio::time::timeout(
                budget + ctx.step_timeout,
                ctx.env.wait_for(selector, budget),
            )
            .await
            {
                Ok(result) => result?,
                Err(_) => {
                    return Err(AttemptError::new(
                        FailureKind::StepTimeout,
                        format!("waiting for '{selector}' did not return"),
                    ))
                }
            };
            if !appeared {
                return Err(AttemptError::new(
                    FailureKind::InputMissing,
                    format!("'{selector}' never appeared"),
                ));
            }
        }
        StepAction::Delay { ms } => {
            tokio::time::sleep(Duration::from_millis(*ms)).await;
        }
        StepAction::Snapshot { label } => {
            capture_snapshot(ctx.env, ctx.hub, label, ctx.snapshot_quality).await;
        }
        StepAction::ExpectState { any_of } => {
            let observed = bounded(ctx, "observe page state", ctx.env.observe_page_state()).await?;
            if observed == PageState::Rejected && !any_of.contains(&PageState::Rejected) {
                return Err(AttemptError::new(
                    FailureKind::UnexpectedPageState,
                    "the target rejected the attempt",
                ));
            }
            if !any_of.contains(&observed) {
                return Err(AttemptError::new(
                    FailureKind::UnexpectedPageState,
                    format!("expected one of {any_of:?}, observed {observed:?}"),
                ));
            }
        }
    }

    Ok(())
}

async fn resolve_value(value: &ValueSource, ctx: &StepContext<'_>) -> Result<String, AttemptError> {
    match value {
        ValueSource::Literal { value } => Ok(value.clone()),
        ValueSource::Identity { field } => Ok(ctx.identity.field(*field).to_owned()),
        ValueSource::Manual { kind } => Ok(ctx
            .pause
            .request_input(kind, ctx.manual_input_timeout)
            .await?),
    }
}

/// Run a driver call within the step budget, classifying a timeout.
async fn bounded<T>(
    ctx: &StepContext<'_>,
    operation: &str,
    call: impl Future<Output = crate::Result<T>>,
) -> Result<T, AttemptError> {
    match tokio::time::timeout(ctx.step_timeout, call).await {
        Ok(result) => result.map_err(AttemptError::from),
        Err(_) => Err(AttemptError::new(
            FailureKind::StepTimeout,
            format!("{operation} exceeded {}s", ctx.step_timeout.as_secs()),
        )),
    }
}

/// Capture and broadcast a labeled snapshot. Failures are logged, not raised.
pub async fn capture_snapshot(env: &dyn Environment, hub: &ObserverHub, label: &str, quality: u8) {
    if !env.is_alive() {
        return;
    }
    match env.capture_frame(quality).await {
        Ok(jpeg) => hub.snapshot(label, &jpeg),
        Err(err) => debug!(%err, label, "snapshot capture failed"),
    }
}
