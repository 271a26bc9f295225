//! `ReminderStore` over a PostgREST endpoint (Supabase `rest/v1`).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;

use crate::config::RestStoreConfig;
use crate::db::{Todo, UserDevice};
use crate::error::{StoreError, StoreResult};
use crate::services::store::ReminderStore;

#[derive(Clone)]
pub struct RestStore {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
}

impl RestStore {
    pub fn new(config: &RestStoreConfig) -> StoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.clone(),
            service_key: config.service_key.clone(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.service_key)
            .header("Authorization", format!("Bearer {}", self.service_key))
    }

    async fn fetch_rows<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> StoreResult<Vec<T>> {
        let response = self
            .authorized(self.client.get(self.table_url(table)))
            .query(query)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status { status, body });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl ReminderStore for RestStore {
    async fn select_due(&self, now: DateTime<Utc>, limit: u32) -> StoreResult<Vec<Todo>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        self.fetch_rows(
            "todos",
            &[
                ("select", "id,user_id,title,start_time".to_string()),
                ("notification_sent", "eq.false".to_string()),
                (
                    "start_time",
                    format!("lte.{}", now.to_rfc3339_opts(SecondsFormat::Millis, true)),
                ),
                ("limit", limit.to_string()),
            ],
        )
        .await
    }

    async fn find_active_device(&self, user_id: &str) -> StoreResult<Option<UserDevice>> {
        let rows: Vec<UserDevice> = self
            .fetch_rows(
                "user_devices",
                &[
                    ("select", "user_id,fcm_token,is_active".to_string()),
                    ("user_id", format!("eq.{}", user_id)),
                    ("is_active", "eq.true".to_string()),
                    ("order", "created_at.desc".to_string()),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;

        Ok(rows.into_iter().next())
    }

    async fn mark_notified(&self, todo_id: &str) -> StoreResult<()> {
        let response = self
            .authorized(self.client.patch(self.table_url("todos")))
            .query(&[("id", format!("eq.{}", todo_id))])
            .header("Prefer", "return=representation")
            .json(&serde_json::json!({ "notification_sent": true }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status { status, body });
        }

        let updated: Vec<serde_json::Value> = response.json().await?;
        if updated.is_empty() {
            return Err(StoreError::NotFound(todo_id.to_string()));
        }

        Ok(())
    }
}
