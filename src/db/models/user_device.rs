use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::deserialize_id;

/// A registered push target for a user.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserDevice {
    #[serde(deserialize_with = "deserialize_id")]
    pub user_id: String,

    /// FCM registration token.
    pub fcm_token: String,

    pub is_active: bool,
}
