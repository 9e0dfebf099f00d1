//! `SQLite` schema bootstrap logic.
//!
//! All table definitions use `CREATE TABLE IF NOT EXISTS`, so they are safe to
//! re-run on every server startup.

use sqlx::SqlitePool;

use crate::Result;

/// Apply all table definitions to the connected `SQLite` database.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS identity_counter (
    name            TEXT PRIMARY KEY NOT NULL,
    value           INTEGER NOT NULL CHECK(value >= 0)
);

CREATE TABLE IF NOT EXISTS attempt (
    id              TEXT PRIMARY KEY NOT NULL,
    run_id          TEXT NOT NULL,
    cycle_index     INTEGER NOT NULL,
    proxy_server    TEXT,
    username        TEXT,
    outcome         TEXT NOT NULL CHECK(outcome IN ('completed','failed')),
    failure_kind    TEXT,
    detail          TEXT,
    started_at      TEXT NOT NULL,
    finished_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_attempt_run ON attempt(run_id, cycle_index);
CREATE INDEX IF NOT EXISTS idx_attempt_finished ON attempt(finished_at);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
