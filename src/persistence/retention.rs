//! Hourly purge of expired attempt history.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};

use super::attempt_repo::AttemptRepo;
use super::db::Database;
use crate::Result;

const PURGE_INTERVAL: Duration = Duration::from_secs(3600);

/// Spawn the retention task.
///
/// The first purge runs immediately, then once an hour, deleting attempt
/// records that finished more than `retention_days` ago.
#[must_use]
pub fn spawn_retention_task(
    db: Arc<Database>,
    retention_days: u32,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let repo = AttemptRepo::new(db);
    let span = info_span!("retention", retention_days);

    tokio::spawn(
        async move {
            let mut ticker = tokio::time::interval(PURGE_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(err) = purge_expired(&repo, retention_days).await {
                            error!(%err, "attempt purge failed");
                        }
                    }
                }
            }
            debug!("retention task stopped");
        }
        .instrument(span),
    )
}

async fn purge_expired(repo: &AttemptRepo, retention_days: u32) -> Result<()> {
    let cutoff = Utc::now() - chrono::Duration::days(i64::from(retention_days));
    let deleted = repo.purge(cutoff).await?;
    if deleted > 0 {
        info!(deleted, %cutoff, "expired attempts purged");
    }
    Ok(())
}
