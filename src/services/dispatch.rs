//! One dispatch cycle: select due todos, authenticate once, then for every
//! todo resolve a device, send, and mark it notified.
//!
//! Only selection and authentication failures abort a cycle. Everything that
//! goes wrong for a single todo ends up in that todo's `DeliveryOutcome` and
//! the todo is still marked, so a broken device or a flaky gateway cannot make
//! the same reminder come back every cycle.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::{Serialize, Serializer};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::DispatchConfig;
use crate::db::Todo;
use crate::error::DispatchError;
use crate::services::credentials::{Credential, CredentialProvider};
use crate::services::fcm::{PushGateway, PushMessage};
use crate::services::store::ReminderStore;

/// What happened to a todo's delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// The gateway answered with this HTTP status (success or not).
    Status(u16),
    /// The owner has no active device; nothing was sent.
    NoDevice,
    /// The device lookup or the gateway call failed before a status was known.
    Failed,
}

impl Serialize for DeliveryStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DeliveryStatus::Status(code) => serializer.serialize_u16(*code),
            DeliveryStatus::NoDevice => serializer.serialize_str("no_device"),
            DeliveryStatus::Failed => serializer.serialize_str("failed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryOutcome {
    pub todo_id: String,
    pub status: DeliveryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether the notified flag was persisted. `false` means the todo may be
    /// selected again next cycle.
    pub marked: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DispatchSummary {
    pub processed: usize,
    pub details: Vec<DeliveryOutcome>,
    /// Selected todos that were not started because the deadline passed.
    #[serde(skip_serializing_if = "is_zero")]
    pub deferred: usize,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchReport {
    NothingDue,
    Completed(DispatchSummary),
}

pub struct DispatchService {
    store: Arc<dyn ReminderStore>,
    credentials: Arc<dyn CredentialProvider>,
    gateway: Arc<dyn PushGateway>,
    config: DispatchConfig,
    click_action: String,
    /// Serializes cycles started from the HTTP trigger and the interval worker.
    running: Mutex<()>,
}

impl DispatchService {
    pub fn new(
        store: Arc<dyn ReminderStore>,
        credentials: Arc<dyn CredentialProvider>,
        gateway: Arc<dyn PushGateway>,
        config: DispatchConfig,
        click_action: String,
    ) -> Self {
        Self {
            store,
            credentials,
            gateway,
            config,
            click_action,
            running: Mutex::new(()),
        }
    }

    /// Run one full dispatch cycle.
    pub async fn run(&self) -> Result<DispatchReport, DispatchError> {
        let _guard = self.running.lock().await;
        let run_id = Uuid::new_v4();
        self.run_cycle()
            .instrument(tracing::info_span!("dispatch", %run_id))
            .await
    }

    async fn run_cycle(&self) -> Result<DispatchReport, DispatchError> {
        let limit = self.config.batch_limit;
        let mut todos = self
            .store
            .select_due(Utc::now(), limit)
            .await
            .map_err(DispatchError::Selection)?;
        todos.truncate(limit as usize);

        if todos.is_empty() {
            tracing::debug!("No todos due for notification");
            return Ok(DispatchReport::NothingDue);
        }

        // A deadline too far out to represent means no deadline.
        let deadline =
            Instant::now().checked_add(Duration::from_secs(self.config.deadline_seconds));
        let selected = todos.len();
        tracing::info!("Selected {} due todo(s)", selected);

        let credential = self
            .credentials
            .acquire()
            .await
            .map_err(DispatchError::Authentication)?;

        let pending: Vec<_> = todos
            .into_iter()
            .map(|todo| self.process_todo(&credential, todo, deadline))
            .collect();
        let results: Vec<Option<DeliveryOutcome>> = stream::iter(pending)
            .buffered(self.config.concurrency.max(1) as usize)
            .collect()
            .await;

        let details: Vec<DeliveryOutcome> = results.into_iter().flatten().collect();
        let deferred = selected - details.len();
        if deferred > 0 {
            tracing::warn!(
                "Dispatch deadline reached; {} todo(s) left for the next cycle",
                deferred
            );
        }

        let unmarked = details.iter().filter(|o| !o.marked).count();
        tracing::info!(
            "Dispatch finished: processed={} unmarked={} deferred={}",
            details.len(),
            unmarked,
            deferred
        );

        Ok(DispatchReport::Completed(DispatchSummary {
            processed: details.len(),
            details,
            deferred,
        }))
    }

    /// Resolve, send and mark a single todo. Returns `None` only when the todo
    /// was not started because the cycle deadline had passed.
    async fn process_todo(
        &self,
        credential: &Credential,
        todo: Todo,
        deadline: Option<Instant>,
    ) -> Option<DeliveryOutcome> {
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return None;
        }

        let (status, error) = match self.store.find_active_device(&todo.user_id).await {
            Ok(Some(device)) => {
                let message = PushMessage::for_todo(&device, &todo, &self.click_action);
                match self.gateway.send(credential, &message).await {
                    Ok(code) => {
                        if (200..300).contains(&code) {
                            tracing::debug!("Notification for todo {} accepted", todo.id);
                        } else {
                            tracing::warn!("Gateway returned {} for todo {}", code, todo.id);
                        }
                        (DeliveryStatus::Status(code), None)
                    }
                    Err(e) => {
                        tracing::warn!("Failed to send notification for todo {}: {}", todo.id, e);
                        (DeliveryStatus::Failed, Some(e.to_string()))
                    }
                }
            }
            Ok(None) => {
                tracing::debug!(
                    "No active device for user {}; skipping todo {}",
                    todo.user_id,
                    todo.id
                );
                (DeliveryStatus::NoDevice, None)
            }
            Err(e) => {
                tracing::warn!("Failed to resolve device for todo {}: {}", todo.id, e);
                (DeliveryStatus::Failed, Some(e.to_string()))
            }
        };

        let marked = match self.store.mark_notified(&todo.id).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!("Failed to mark todo {} as notified: {}", todo.id, e);
                false
            }
        };

        Some(DeliveryOutcome {
            todo_id: todo.id,
            status,
            error,
            marked,
        })
    }
}
