//! Store seam used by the dispatcher.
//!
//! The pipeline only needs three queries: pick due todos, resolve a device and
//! flip the notified flag. Backends live behind `ReminderStore` so the
//! dispatcher can run against SQLite, a PostgREST endpoint, or a test double.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::db::{Todo, TodoRepository, UserDevice, UserDeviceRepository};
use crate::error::StoreResult;

#[async_trait]
pub trait ReminderStore: Send + Sync + 'static {
    /// Todos with `notification_sent = false` and `start_time <= now`, at most `limit`.
    async fn select_due(&self, now: DateTime<Utc>, limit: u32) -> StoreResult<Vec<Todo>>;

    /// One active device for the user; most recently registered wins.
    async fn find_active_device(&self, user_id: &str) -> StoreResult<Option<UserDevice>>;

    async fn mark_notified(&self, todo_id: &str) -> StoreResult<()>;
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReminderStore for SqliteStore {
    async fn select_due(&self, now: DateTime<Utc>, limit: u32) -> StoreResult<Vec<Todo>> {
        TodoRepository::find_due(&self.pool, now, limit as i64).await
    }

    async fn find_active_device(&self, user_id: &str) -> StoreResult<Option<UserDevice>> {
        UserDeviceRepository::find_active_for_user(&self.pool, user_id).await
    }

    async fn mark_notified(&self, todo_id: &str) -> StoreResult<()> {
        TodoRepository::mark_notified(&self.pool, todo_id).await
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{DateTime, Utc};
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::SqlitePool;

    /// Fresh in-memory database with the real migrations applied.
    pub async fn memory_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    pub async fn insert_todo(
        pool: &SqlitePool,
        id: &str,
        user_id: &str,
        start_time: Option<DateTime<Utc>>,
        notification_sent: bool,
    ) {
        sqlx::query(
            "INSERT INTO todos (id, user_id, title, start_time, notification_sent) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(user_id)
        .bind(format!("Todo {}", id))
        .bind(start_time)
        .bind(notification_sent)
        .execute(pool)
        .await
        .unwrap();
    }

    pub async fn insert_device(
        pool: &SqlitePool,
        user_id: &str,
        token: &str,
        is_active: bool,
        created_at: DateTime<Utc>,
    ) {
        sqlx::query(
            "INSERT INTO user_devices (id, user_id, fcm_token, is_active, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(token)
        .bind(is_active)
        .bind(created_at)
        .execute(pool)
        .await
        .unwrap();
    }
}
