//! Cycle scheduler: drives independent attempts one after another.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use super::pause::PauseCoordinator;
use super::run_state::{RunGuard, RunState};
use super::session::SessionRunner;
use crate::models::attempt::build_contexts;
use crate::models::event::{CancelReason, RunStatus};
use crate::models::run::RunConfiguration;
use crate::observer::ObserverHub;
use crate::persistence::attempt_repo::AttemptRepo;
use crate::{AppError, Result};

/// Totals for one finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Identifier stamped on every attempt record of the run.
    pub run_id: String,
    /// Attempts started.
    pub cycles: usize,
    /// Attempts that ran the whole flow.
    pub completed: usize,
    /// Attempts that ended with a failure kind.
    pub failed: usize,
    /// Terminal status emitted to observers.
    pub status: RunStatus,
    /// Reason the run aborted, if it was fatal.
    pub fatal: Option<String>,
}

/// Owns the run flag and iterates attempt contexts.
pub struct CycleScheduler {
    runner: SessionRunner,
    pause: Arc<PauseCoordinator>,
    hub: ObserverHub,
    run_state: RunState,
    attempts: Option<AttemptRepo>,
    cooldown: Duration,
    // Taken at admission and held until the run has wound down, so a run that
    // is still finishing its step after a stop blocks the next `start`.
    active: Arc<Mutex<()>>,
}

impl CycleScheduler {
    /// Create an idle scheduler.
    #[must_use]
    pub fn new(
        runner: SessionRunner,
        pause: Arc<PauseCoordinator>,
        hub: ObserverHub,
        cooldown: Duration,
    ) -> Self {
        Self {
            runner,
            pause,
            hub,
            run_state: RunState::new(),
            attempts: None,
            cooldown,
            active: Arc::new(Mutex::new(())),
        }
    }

    /// Record every finished attempt in `repo`.
    #[must_use]
    pub fn with_attempt_log(mut self, repo: AttemptRepo) -> Self {
        self.attempts = Some(repo);
        self
    }

    /// The run flag owned by this scheduler.
    #[must_use]
    pub fn run_state(&self) -> &RunState {
        &self.run_state
    }

    /// Whether a run is active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.run_state.is_running()
    }

    /// Accept a run and drive it on a background task.
    ///
    /// Returns `Ok(false)` without side effects if a run is active or a
    /// stopped run is still finishing its current step.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `config` fails validation; no run starts.
    pub fn start(self: &Arc<Self>, config: RunConfiguration) -> Result<bool> {
        let Ok(active) = Arc::clone(&self.active).try_lock_owned() else {
            self.refuse("start");
            return Ok(false);
        };
        self.admit(&config)?;

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let _active = active;
            let summary = this.drive(config).await;
            info!(
                run_id = %summary.run_id,
                cycles = summary.cycles,
                completed = summary.completed,
                failed = summary.failed,
                status = ?summary.status,
                "run finished"
            );
        });
        Ok(true)
    }

    /// Accept a run and drive it to completion on the caller's task.
    ///
    /// Returns `Ok(None)` if a run is active or still winding down.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `config` fails validation.
    pub async fn run(&self, config: RunConfiguration) -> Result<Option<RunSummary>> {
        let Ok(_active) = self.active.try_lock() else {
            self.refuse("run");
            return Ok(None);
        };
        self.admit(&config)?;
        Ok(Some(self.drive(config).await))
    }

    fn refuse(&self, what: &str) {
        if self.run_state.is_running() {
            info!("{what} ignored; a run is already active");
            self.hub.warn("a run is already active");
        } else {
            info!("{what} ignored; the previous run is still stopping");
            self.hub.warn("the previous run is still stopping");
        }
    }

    // Caller holds `active`, so the flag is clear unless a guard leaked.
    fn admit(&self, config: &RunConfiguration) -> Result<()> {
        config.validate()?;
        if !self.run_state.try_begin() {
            return Err(AppError::Config("run flag already set".into()));
        }
        Ok(())
    }

    /// Request a cooperative stop.
    ///
    /// The in-flight attempt finishes its current step; a pending manual
    /// input request is cancelled. Returns `false` if nothing was running.
    pub async fn stop(&self) -> bool {
        if !self.run_state.request_stop() {
            info!("stop ignored; no run is active");
            return false;
        }
        self.hub.warn("stop requested; finishing the current step");
        self.pause.cancel_pending(CancelReason::StopRequested).await;
        true
    }

    /// Resolve once no run is being driven, including one that was asked to
    /// stop but is still finishing its current step.
    pub async fn wait_idle(&self) {
        let _active = self.active.lock().await;
    }

    /// Iterate attempt contexts. The caller holds `active` and the run flag.
    async fn drive(&self, config: RunConfiguration) -> RunSummary {
        let _guard = RunGuard(&self.run_state);
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!("run", run_id = %run_id);

        async {
            let mut summary = RunSummary {
                run_id: run_id.clone(),
                cycles: 0,
                completed: 0,
                failed: 0,
                status: RunStatus::Running,
                fatal: None,
            };

            let contexts = match build_contexts(&config.proxies) {
                Ok(contexts) => contexts,
                Err(err) => {
                    let reason = format!("could not build attempt list: {err}");
                    self.run_state.finish();
                    self.hub.error(reason.clone());
                    self.hub.status(RunStatus::Failed, Some(reason.clone()));
                    summary.status = RunStatus::Failed;
                    summary.fatal = Some(reason);
                    return summary;
                }
            };

            let total = contexts.len();
            self.hub.status(
                RunStatus::Running,
                Some(format!("{total} attempt(s) scheduled")),
            );

            for (position, context) in contexts.iter().enumerate() {
                if !self.run_state.is_running() {
                    info!(remaining = total - position, "run stopped at cycle boundary");
                    break;
                }

                summary.cycles += 1;
                let record = self
                    .runner
                    .run_session(&run_id, context, &config, &self.run_state)
                    .await;
                if record.outcome.is_completed() {
                    summary.completed += 1;
                } else {
                    summary.failed += 1;
                }

                if let Some(ref repo) = self.attempts {
                    if let Err(err) = repo.insert(&record).await {
                        warn!(%err, "failed to record attempt");
                    }
                }

                if position + 1 < total && self.run_state.is_running() {
                    self.cool_down().await;
                }
            }

            summary.status = if self.run_state.is_running() {
                RunStatus::Completed
            } else {
                RunStatus::Stopped
            };
            self.run_state.finish();
            let message = format!(
                "{} attempt(s): {} completed, {} failed",
                summary.cycles, summary.completed, summary.failed
            );
            self.hub.info(message.clone());
            self.hub.status(summary.status, Some(message));
            summary
        }
        .instrument(span)
        .await
    }

    async fn cool_down(&self) {
        if self.cooldown.is_zero() {
            return;
        }
        self.hub
            .info(format!("cooling down for {}s", self.cooldown.as_secs()));
        tokio::select! {
            () = tokio::time::sleep(self.cooldown) => {}
            () = self.run_state.stopped() => {}
        }
    }
}
