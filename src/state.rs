//! Shared application state and the command dispatcher used by every transport.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use crate::config::GlobalConfig;
use crate::models::event::OperatorCommand;
use crate::observer::ObserverHub;
use crate::orchestrator::pause::{PauseCoordinator, SubmitOutcome};
use crate::orchestrator::scheduler::CycleScheduler;
use crate::persistence::attempt_repo::AttemptRepo;
use crate::persistence::db::Database;
use crate::Result;

/// State shared by the WebSocket and IPC transports.
pub struct AppState {
    /// Global configuration.
    pub config: Arc<GlobalConfig>,
    /// `SQLite` connection pool.
    pub db: Arc<Database>,
    /// Observer event fan-out.
    pub hub: ObserverHub,
    /// Manual-input rendezvous.
    pub pause: Arc<PauseCoordinator>,
    /// The single cycle scheduler.
    pub scheduler: Arc<CycleScheduler>,
    /// Shared secret required on IPC requests, when set.
    pub ipc_auth_token: Option<String>,
}

impl AppState {
    /// Apply an operator command and describe the result.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a `start` command carries an invalid
    /// run configuration.
    pub async fn apply(&self, command: OperatorCommand) -> Result<Value> {
        match command {
            OperatorCommand::Start { config } => {
                let started = self.scheduler.start(config)?;
                Ok(json!({ "started": started }))
            }
            OperatorCommand::Stop => {
                let stopped = self.scheduler.stop().await;
                Ok(json!({ "stopped": stopped }))
            }
            OperatorCommand::ManualResponse { value, request_id } => {
                let outcome = self
                    .pause
                    .submit_response(value, request_id.as_deref())
                    .await;
                info!(?outcome, "manual response handled");
                Ok(match outcome {
                    SubmitOutcome::Delivered { request_id, kind } => {
                        json!({ "delivered": true, "request_id": request_id, "kind": kind })
                    }
                    SubmitOutcome::NoPendingRequest => {
                        json!({ "delivered": false, "reason": "no pending request" })
                    }
                    SubmitOutcome::Stale { request_id } => {
                        json!({ "delivered": false, "reason": "stale request", "request_id": request_id })
                    }
                })
            }
        }
    }

    /// Current scheduler status, pending request, and attempt totals.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the attempt totals cannot be read.
    pub async fn status_snapshot(&self) -> Result<Value> {
        let (completed, failed) = AttemptRepo::new(Arc::clone(&self.db)).totals().await?;
        let pending = self.pause.pending().await.map(|pending| {
            json!({ "request_id": pending.request_id, "kind": pending.kind })
        });

        Ok(json!({
            "status": self.hub.current_status(),
            "running": self.scheduler.is_running(),
            "pending": pending,
            "dashboards": self.hub.connections(),
            "attempts": { "completed": completed, "failed": failed },
        }))
    }
}
