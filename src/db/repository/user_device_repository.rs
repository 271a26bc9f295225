use sqlx::SqlitePool;

use crate::db::models::UserDevice;
use crate::error::{StoreError, StoreResult};

pub struct UserDeviceRepository;

impl UserDeviceRepository {
    /// Most recently registered active device for the user, if any.
    pub async fn find_active_for_user(
        pool: &SqlitePool,
        user_id: &str,
    ) -> StoreResult<Option<UserDevice>> {
        let row = sqlx::query_as::<_, UserDevice>(
            r#"
            SELECT user_id, fcm_token, is_active
            FROM user_devices
            WHERE user_id = ?
              AND is_active = 1
            ORDER BY julianday(created_at) DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(StoreError::Database)?;

        Ok(row)
    }
}
