use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{deserialize_id, deserialize_lenient_time, deserialize_nullable_string};

/// A reminder awaiting a push notification.
///
/// Rows are produced by the todo app. This service only reads them and sets
/// `notification_sent` once a delivery attempt has been made.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Todo {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,

    /// Owner of the reminder (references the device owner).
    #[serde(deserialize_with = "deserialize_id")]
    pub user_id: String,

    #[serde(default, deserialize_with = "deserialize_nullable_string")]
    pub title: String,

    /// Scheduled trigger time; the reminder is due once this has passed.
    /// Backends filter on it, so it is informational once a row is selected.
    #[serde(default, deserialize_with = "deserialize_lenient_time")]
    pub start_time: Option<DateTime<Utc>>,

    /// Absent from REST projections that do not select it.
    #[serde(default)]
    pub notification_sent: bool,
}
