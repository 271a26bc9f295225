use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::FcmConfig;
use crate::db::{Todo, UserDevice};
use crate::error::GatewayError;
use crate::services::credentials::Credential;

pub const NOTIFICATION_TITLE: &str = "Reminder";

/// Body of an FCM HTTP v1 `messages:send` request.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SendRequest {
    pub message: PushMessage,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PushMessage {
    pub token: String,
    pub notification: PushNotification,
    pub data: PushData,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PushNotification {
    pub title: String,
    pub body: String,
}

/// FCM data values must be strings.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PushData {
    pub click_action: String,
    pub todo_id: String,
}

impl PushMessage {
    pub fn for_todo(device: &UserDevice, todo: &Todo, click_action: &str) -> Self {
        Self {
            token: device.fcm_token.clone(),
            notification: PushNotification {
                title: NOTIFICATION_TITLE.to_string(),
                body: format!("It's time for: {}", todo.title),
            },
            data: PushData {
                click_action: click_action.to_string(),
                todo_id: todo.id.clone(),
            },
        }
    }
}

/// Opaque push transport: submit one message, report the HTTP status.
#[async_trait]
pub trait PushGateway: Send + Sync + 'static {
    /// Returns the transport status code for any HTTP response (including
    /// error statuses). Only transport failures are errors.
    async fn send(&self, credential: &Credential, message: &PushMessage)
        -> Result<u16, GatewayError>;
}

#[derive(Clone)]
pub struct FcmClient {
    client: reqwest::Client,
    base_url: String,
    project_id: String,
}

impl FcmClient {
    pub fn new(config: &FcmConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            project_id: config.service_account.project_id.clone(),
        })
    }

    fn send_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/messages:send",
            self.base_url, self.project_id
        )
    }
}

#[async_trait]
impl PushGateway for FcmClient {
    async fn send(
        &self,
        credential: &Credential,
        message: &PushMessage,
    ) -> Result<u16, GatewayError> {
        let response = self
            .client
            .post(self.send_url())
            .header("Authorization", credential.authorization_header())
            .header("Content-Type", "application/json")
            .json(&SendRequest {
                message: message.clone(),
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::debug!(
                "FCM returned {} for todo {}: {}",
                status,
                message.data.todo_id,
                error_text
            );
        }

        Ok(status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use chrono::Utc;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credential() -> Credential {
        Credential {
            access_token: "ya29.token".to_string(),
            token_type: "Bearer".to_string(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        }
    }

    fn todo() -> Todo {
        Todo {
            id: "todo-1".to_string(),
            user_id: "user-1".to_string(),
            title: "Water the plants".to_string(),
            start_time: Some(Utc::now()),
            notification_sent: false,
        }
    }

    fn device() -> UserDevice {
        UserDevice {
            user_id: "user-1".to_string(),
            fcm_token: "device-token".to_string(),
            is_active: true,
        }
    }

    fn client_for(base_url: String) -> FcmClient {
        let mut fcm = Config::default().fcm;
        fcm.base_url = base_url;
        fcm.request_timeout_seconds = 2;
        FcmClient::new(&fcm).unwrap()
    }

    #[test]
    fn message_has_fixed_shape() {
        let message = PushMessage::for_todo(&device(), &todo(), "FLUTTER_NOTIFICATION_CLICK");
        let body = serde_json::to_value(SendRequest { message }).unwrap();

        assert_eq!(
            body,
            json!({
                "message": {
                    "token": "device-token",
                    "notification": {
                        "title": "Reminder",
                        "body": "It's time for: Water the plants"
                    },
                    "data": {
                        "click_action": "FLUTTER_NOTIFICATION_CLICK",
                        "todo_id": "todo-1"
                    }
                }
            })
        );
    }

    #[tokio::test]
    async fn posts_to_project_endpoint_with_bearer() {
        let server = MockServer::start().await;
        let message = PushMessage::for_todo(&device(), &todo(), "OPEN_TODO");

        Mock::given(method("POST"))
            .and(path("/v1/projects/demo-project/messages:send"))
            .and(header("Authorization", "Bearer ya29.token"))
            .and(body_json(SendRequest {
                message: message.clone(),
            }))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "name": "projects/demo-project/messages/1" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let status = client_for(server.uri())
            .send(&credential(), &message)
            .await
            .unwrap();
        assert_eq!(status, 200);
    }

    #[tokio::test]
    async fn error_status_is_reported_not_raised() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": { "status": "NOT_FOUND", "message": "Requested entity was not found." }
            })))
            .mount(&server)
            .await;

        let message = PushMessage::for_todo(&device(), &todo(), "OPEN_TODO");
        let status = client_for(server.uri())
            .send(&credential(), &message)
            .await
            .unwrap();
        assert_eq!(status, 404);
    }

    #[tokio::test]
    async fn slow_gateway_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(5)))
            .mount(&server)
            .await;

        let message = PushMessage::for_todo(&device(), &todo(), "OPEN_TODO");
        let err = client_for(server.uri())
            .send(&credential(), &message)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Timeout));
    }

    #[tokio::test]
    async fn unreachable_gateway_is_a_transport_error() {
        let message = PushMessage::for_todo(&device(), &todo(), "OPEN_TODO");
        let err = client_for("http://127.0.0.1:1".to_string())
            .send(&credential(), &message)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Request(_)));
    }
}
