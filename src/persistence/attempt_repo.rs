//! Attempt history repository for `SQLite` persistence.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::models::attempt::AttemptRecord;
use crate::models::failure::{AttemptError, AttemptOutcome, FailureKind};
use crate::{AppError, Result};

use super::db::Database;

/// Repository for per-cycle attempt records.
#[derive(Clone)]
pub struct AttemptRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct AttemptRow {
    id: String,
    run_id: String,
    cycle_index: i64,
    proxy_server: Option<String>,
    username: Option<String>,
    outcome: String,
    failure_kind: Option<String>,
    detail: Option<String>,
    started_at: String,
    finished_at: String,
}

impl AttemptRow {
    fn into_record(self) -> Result<AttemptRecord> {
        let outcome = match self.outcome.as_str() {
            "completed" => AttemptOutcome::Completed,
            "failed" => {
                let tag = self.failure_kind.unwrap_or_default();
                let kind = FailureKind::from_tag(&tag)
                    .ok_or_else(|| AppError::Db(format!("invalid failure kind: {tag}")))?;
                AttemptOutcome::Failed(AttemptError::new(kind, self.detail.unwrap_or_default()))
            }
            other => return Err(AppError::Db(format!("invalid attempt outcome: {other}"))),
        };

        Ok(AttemptRecord {
            id: self.id,
            run_id: self.run_id,
            cycle_index: usize::try_from(self.cycle_index)
                .map_err(|e| AppError::Db(format!("invalid cycle_index: {e}")))?,
            proxy_server: self.proxy_server,
            username: self.username,
            outcome,
            started_at: parse_timestamp(&self.started_at)?,
            finished_at: parse_timestamp(&self.finished_at)?,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| AppError::Db(format!("invalid timestamp '{raw}': {e}")))
}

impl AttemptRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a finished attempt.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    pub async fn insert(&self, record: &AttemptRecord) -> Result<()> {
        let (outcome, failure_kind, detail) = match &record.outcome {
            AttemptOutcome::Completed => ("completed", None, None),
            AttemptOutcome::Failed(err) => ("failed", Some(err.kind.as_str()), Some(err.detail.as_str())),
        };
        let cycle_index = i64::try_from(record.cycle_index)
            .map_err(|e| AppError::Db(format!("cycle_index out of range: {e}")))?;

        sqlx::query(
            "INSERT INTO attempt (id, run_id, cycle_index, proxy_server, username, outcome,
                                  failure_kind, detail, started_at, finished_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .bind(&record.id)
        .bind(&record.run_id)
        .bind(cycle_index)
        .bind(&record.proxy_server)
        .bind(&record.username)
        .bind(outcome)
        .bind(failure_kind)
        .bind(detail)
        .bind(record.started_at.to_rfc3339())
        .bind(record.finished_at.to_rfc3339())
        .execute(self.db.as_ref())
        .await?;

        Ok(())
    }

    /// All attempts of a run, in cycle order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails or a row is malformed.
    pub async fn list_for_run(&self, run_id: &str) -> Result<Vec<AttemptRecord>> {
        let rows: Vec<AttemptRow> = sqlx::query_as(
            "SELECT id, run_id, cycle_index, proxy_server, username, outcome,
                    failure_kind, detail, started_at, finished_at
             FROM attempt
             WHERE run_id = ?1
             ORDER BY cycle_index ASC",
        )
        .bind(run_id)
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(AttemptRow::into_record).collect()
    }

    /// Count attempts per outcome across all runs: `(completed, failed)`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn totals(&self) -> Result<(i64, i64)> {
        let totals: (i64, i64) = sqlx::query_as(
            "SELECT COALESCE(SUM(outcome = 'completed'), 0), COALESCE(SUM(outcome = 'failed'), 0)
             FROM attempt",
        )
        .fetch_one(self.db.as_ref())
        .await?;
        Ok(totals)
    }

    /// Purge attempts finished before `before`.
    ///
    /// Returns the number of rows deleted.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn purge(&self, before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM attempt WHERE finished_at < ?1")
            .bind(before.to_rfc3339())
            .execute(self.db.as_ref())
            .await?;
        Ok(result.rows_affected())
    }
}
