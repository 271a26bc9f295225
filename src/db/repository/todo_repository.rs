use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::db::models::Todo;
use crate::error::{StoreError, StoreResult};

/// Repository for the `todos` table.
///
/// Timestamps are compared through `julianday()` so rows written with either
/// RFC 3339 (`T`, offset) or SQLite's `CURRENT_TIMESTAMP` layout compare by
/// instant rather than by text.
pub struct TodoRepository;

impl TodoRepository {
    /// Fetch up to `limit` todos that are due at `now` and have not been notified.
    pub async fn find_due(
        pool: &SqlitePool,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<Todo>> {
        if limit <= 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, Todo>(
            r#"
            SELECT
                id,
                user_id,
                title,
                start_time,
                notification_sent
            FROM todos
            WHERE notification_sent = 0
              AND start_time IS NOT NULL
              AND julianday(start_time) <= julianday(?)
            LIMIT ?
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(StoreError::Database)?;

        Ok(rows)
    }

    /// Set `notification_sent` for the given todo.
    ///
    /// Marking an already-notified todo succeeds; an unknown id is `NotFound`.
    pub async fn mark_notified(pool: &SqlitePool, id: &str) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE todos
            SET notification_sent = 1
            WHERE id = ?
            "#,
        )
        .bind(id)
        .execute(pool)
        .await
        .map_err(StoreError::Database)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }

        Ok(())
    }

    #[cfg(test)]
    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> StoreResult<Option<Todo>> {
        let row = sqlx::query_as::<_, Todo>(
            r#"
            SELECT id, user_id, title, start_time, notification_sent
            FROM todos
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(StoreError::Database)?;

        Ok(row)
    }
}
