//! Identity sequence counter repository.

use std::sync::Arc;

use crate::Result;

use super::db::Database;

/// Repository for named monotonic counters.
#[derive(Clone)]
pub struct IdentityCounterRepo {
    db: Arc<Database>,
}

impl IdentityCounterRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Return the current value of `name` and persist the increment.
    ///
    /// A missing counter starts at `start`. Read, increment, and write happen
    /// in a single statement.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the upsert fails.
    pub async fn next(&self, name: &str, start: i64) -> Result<i64> {
        let value: i64 = sqlx::query_scalar(
            "INSERT INTO identity_counter (name, value) VALUES (?1, ?2 + 1)
             ON CONFLICT(name) DO UPDATE SET value = value + 1
             RETURNING value - 1",
        )
        .bind(name)
        .bind(start)
        .fetch_one(self.db.as_ref())
        .await?;
        Ok(value)
    }

    /// Current stored value, if the counter exists.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn current(&self, name: &str) -> Result<Option<i64>> {
        let value: Option<i64> =
            sqlx::query_scalar("SELECT value FROM identity_counter WHERE name = ?1")
                .bind(name)
                .fetch_optional(self.db.as_ref())
                .await?;
        Ok(value)
    }

    /// Overwrite the stored value.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the upsert fails.
    pub async fn set(&self, name: &str, value: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO identity_counter (name, value) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value",
        )
        .bind(name)
        .bind(value)
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }
}
