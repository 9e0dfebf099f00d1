//! One end-to-end attempt: acquire, execute, release.
//!
//! The runner never returns an error. Every failure is classified, logged,
//! captured in a labeled snapshot when the environment is still alive, and
//! stored on the returned [`AttemptRecord`].

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tracing::{debug, info_span, warn, Instrument};

use super::identity::IdentityGenerator;
use super::pause::PauseCoordinator;
use super::preview::PreviewStreamer;
use super::run_state::RunState;
use crate::config::GlobalConfig;
use crate::driver::{Environment, EnvironmentLease, EnvironmentProvider, EnvironmentSpec};
use crate::flow::executor::{capture_snapshot, execute_step, StepContext, StepDisposition};
use crate::flow::FlowDefinition;
use crate::models::attempt::{AttemptContext, AttemptRecord};
use crate::models::failure::{AttemptError, AttemptOutcome, FailureKind};
use crate::models::identity::Identity;
use crate::models::run::RunConfiguration;
use crate::observer::ObserverHub;

/// Timing and quality knobs for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Wait budget per driver call and for environment acquisition.
    pub step_timeout: Duration,
    /// Wait budget per manual-input request.
    pub manual_input_timeout: Duration,
    /// Interval between preview frames.
    pub preview_interval: Duration,
    /// JPEG quality for preview frames.
    pub preview_quality: u8,
    /// JPEG quality for labeled snapshots.
    pub snapshot_quality: u8,
}

impl SessionSettings {
    /// Derive settings from the global configuration.
    #[must_use]
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self {
            step_timeout: config.step_timeout(),
            manual_input_timeout: config.manual_input_timeout(),
            preview_interval: config.preview_interval(),
            preview_quality: config.pacing.preview_quality,
            snapshot_quality: config.pacing.snapshot_quality,
        }
    }
}

/// Executes the configured flow once per attempt context.
pub struct SessionRunner {
    provider: Arc<dyn EnvironmentProvider>,
    flow: Arc<FlowDefinition>,
    identities: IdentityGenerator,
    pause: Arc<PauseCoordinator>,
    hub: ObserverHub,
    settings: SessionSettings,
}

impl SessionRunner {
    /// Construct a runner.
    #[must_use]
    pub fn new(
        provider: Arc<dyn EnvironmentProvider>,
        flow: Arc<FlowDefinition>,
        identities: IdentityGenerator,
        pause: Arc<PauseCoordinator>,
        hub: ObserverHub,
        settings: SessionSettings,
    ) -> Self {
        Self {
            provider,
            flow,
            identities,
            pause,
            hub,
            settings,
        }
    }

    /// Run one attempt to completion.
    ///
    /// The environment, once acquired, is released exactly once before this
    /// returns, and the preview producer is stopped before the release.
    pub async fn run_session(
        &self,
        run_id: &str,
        context: &AttemptContext,
        config: &RunConfiguration,
        run_state: &RunState,
    ) -> AttemptRecord {
        let cycle = context.index + 1;
        let span = info_span!("attempt", cycle, proxy = %context.label());
        let mut record = AttemptRecord::begin(run_id, context);

        async move {
            self.hub
                .info(format!("cycle {cycle}: starting via {}", context.label()));

            let identity = match self.identities.generate(config).await {
                Ok(identity) => identity,
                Err(err) => {
                    let err = AttemptError::new(FailureKind::IdentityUnavailable, err.to_string());
                    self.report_failure(cycle, &err);
                    return record.finish(AttemptOutcome::Failed(err));
                }
            };
            record.username = Some(identity.username.clone());
            self.hub.info(format!(
                "cycle {cycle}: identity {} on {}",
                identity.username, identity.viewport.name
            ));

            let lease = match self.acquire(context, &identity).await {
                Ok(lease) => lease,
                Err(err) => {
                    self.report_failure(cycle, &err);
                    return record.finish(AttemptOutcome::Failed(err));
                }
            };

            let preview = PreviewStreamer::new(
                self.settings.preview_interval,
                self.settings.preview_quality,
                self.hub.clone(),
            )
            .spawn(Arc::clone(lease.env()));

            let env = Arc::clone(lease.env());
            let steps = AssertUnwindSafe(self.execute_steps(
                env.as_ref(),
                &identity,
                config,
                run_state,
            ))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(AttemptError::new(
                    FailureKind::DriverFault,
                    panic_message(panic.as_ref()),
                ))
            });

            let outcome = match steps {
                Ok(()) => {
                    self.hub.success(format!("cycle {cycle}: flow completed"));
                    AttemptOutcome::Completed
                }
                Err(err) => {
                    self.report_failure(cycle, &err);
                    capture_snapshot(
                        env.as_ref(),
                        &self.hub,
                        "error",
                        self.settings.snapshot_quality,
                    )
                    .await;
                    AttemptOutcome::Failed(err)
                }
            };

            preview.stop().await;
            drop(env);
            if let Err(err) = lease.release().await {
                warn!(%err, "environment release reported an error");
                self.hub
                    .warn(format!("cycle {cycle}: environment teardown error: {err}"));
            }
            self.hub.info(format!("cycle {cycle}: ended"));

            record.finish(outcome)
        }
        .instrument(span)
        .await
    }

    async fn acquire(
        &self,
        context: &AttemptContext,
        identity: &Identity,
    ) -> Result<EnvironmentLease, AttemptError> {
        let spec = EnvironmentSpec {
            proxy: context.proxy.clone(),
            viewport: identity.viewport.clone(),
        };

        match tokio::time::timeout(self.settings.step_timeout, self.provider.acquire(&spec)).await {
            Ok(Ok(env)) => Ok(EnvironmentLease::new(env)),
            Ok(Err(err)) => Err(AttemptError::new(
                FailureKind::EnvironmentAcquisitionFailure,
                err.to_string(),
            )),
            Err(_) => Err(AttemptError::new(
                FailureKind::EnvironmentAcquisitionFailure,
                format!(
                    "environment not ready within {}s",
                    self.settings.step_timeout.as_secs()
                ),
            )),
        }
    }

    async fn execute_steps(
        &self,
        env: &dyn Environment,
        identity: &Identity,
        config: &RunConfiguration,
        run_state: &RunState,
    ) -> Result<(), AttemptError> {
        let ctx = StepContext {
            env,
            identity,
            config,
            pause: &self.pause,
            hub: &self.hub,
            step_timeout: self.settings.step_timeout,
            manual_input_timeout: self.settings.manual_input_timeout,
            snapshot_quality: self.settings.snapshot_quality,
        };

        for step in &self.flow.steps {
            if !run_state.is_running() {
                return Err(AttemptError::new(
                    FailureKind::Cancelled,
                    format!("stop requested before '{}'", step.name),
                ));
            }

            match execute_step(step, &ctx).await? {
                StepDisposition::Ran => debug!(step = %step.name, "step ran"),
                StepDisposition::Skipped => debug!(step = %step.name, "step skipped"),
            }
        }

        Ok(())
    }

    fn report_failure(&self, cycle: usize, err: &AttemptError) {
        self.hub.error(format!(
            "cycle {cycle}: failed [{}] {}",
            err.kind, err.detail
        ));
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("step panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("step panicked: {message}")
    } else {
        "step panicked".to_owned()
    }
}
