use std::sync::Arc;

use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

use crate::error::{AppError, AppResult};
use crate::services::dispatch::{DispatchReport, DispatchSummary};
use crate::AppState;

type HmacSha256 = Hmac<Sha256>;

const TRIGGER_MAC_KEY: &[u8] = b"todo-notifications/trigger";

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(notify_users).post(notify_users))
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct NothingDueResponse {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct DispatchResponse {
    pub success: bool,
    #[serde(flatten)]
    pub summary: DispatchSummary,
}

// ============================================================================
// Handlers
// ============================================================================

/// Run one dispatch cycle and report what happened.
async fn notify_users(State(state): State<Arc<AppState>>, headers: HeaderMap) -> AppResult<Response> {
    if let Some(expected) = state.config.server.trigger_token.as_deref() {
        authorize_trigger(&headers, expected)?;
    }

    let response = match state.dispatcher.run().await? {
        DispatchReport::NothingDue => Json(NothingDueResponse {
            message: "No todos to notify",
        })
        .into_response(),
        DispatchReport::Completed(summary) => Json(DispatchResponse {
            success: true,
            summary,
        })
        .into_response(),
    };

    Ok(response)
}

fn authorize_trigger(headers: &HeaderMap, expected: &str) -> AppResult<()> {
    let provided = headers
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;

    if !verify_trigger_token(provided, expected) {
        tracing::warn!("Rejected dispatch trigger with invalid token");
        return Err(AppError::Unauthorized);
    }

    Ok(())
}

fn trigger_mac(token: &str) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(TRIGGER_MAC_KEY).ok()?;
    mac.update(token.as_bytes());
    Some(mac)
}

/// Compare tokens through their HMAC tags so the check runs in constant time
/// whatever the token lengths.
fn verify_trigger_token(provided: &str, expected: &str) -> bool {
    match (trigger_mac(provided), trigger_mac(expected)) {
        (Some(provided), Some(expected)) => {
            let expected_tag = expected.finalize().into_bytes();
            provided.verify_slice(&expected_tag).is_ok()
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::routes::build_router;
    use crate::services::dispatch::test_support::*;
    use crate::services::dispatch::DispatchService;
    use axum::body::Body;
    use http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn app(store: FakeStore, fail_auth: bool, trigger_token: Option<&str>) -> Router {
        let mut config = Config::default();
        config.server.trigger_token = trigger_token.map(|t| t.to_string());
        let events = store.events.clone();
        let dispatcher = DispatchService::new(
            Arc::new(store),
            Arc::new(FakeCredentials {
                fail: fail_auth,
                events: events.clone(),
            }),
            Arc::new(FakeGateway {
                events,
                ..Default::default()
            }),
            config.dispatch.clone(),
            config.fcm.click_action.clone(),
        );
        build_router(Arc::new(AppState { config, dispatcher }))
    }

    async fn call(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post() -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/notify-users")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn reports_nothing_due() {
        let store = FakeStore::with_todos(Vec::new(), EventLog::default());
        let (status, body) = call(app(store, false, None), post()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({ "message": "No todos to notify" }));
    }

    #[tokio::test]
    async fn reports_processed_todos() {
        let store = FakeStore::with_todos(
            vec![todo("t1", "u1"), todo("t2", "u2")],
            EventLog::default(),
        )
        .device("u1", "tok-1");
        let (status, body) = call(app(store, false, None), post()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            serde_json::json!({
                "success": true,
                "processed": 2,
                "details": [
                    { "todoId": "t1", "status": 200, "marked": true },
                    { "todoId": "t2", "status": "no_device", "marked": true }
                ]
            })
        );
    }

    #[tokio::test]
    async fn fatal_failure_is_a_500_with_error_message() {
        let store = FakeStore::with_todos(vec![todo("t1", "u1")], EventLog::default());
        let (status, body) = call(app(store, true, None), post()).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let message = body["error"].as_str().unwrap();
        assert!(message.starts_with("Failed to authenticate with the messaging gateway"));
    }

    #[tokio::test]
    async fn trigger_token_is_enforced() {
        let store = FakeStore::with_todos(vec![todo("t1", "u1")], EventLog::default());
        let events = store.events.clone();
        let (status, _) = call(app(store, false, Some("s3cret")), post()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(events.lock().unwrap().is_empty());

        let store = FakeStore::with_todos(vec![todo("t1", "u1")], EventLog::default());
        let events = store.events.clone();
        let request = Request::builder()
            .method("POST")
            .uri("/notify-users")
            .header("Authorization", "Bearer s3cret-but-longer")
            .body(Body::empty())
            .unwrap();
        let (status, _) = call(app(store, false, Some("s3cret")), request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(events.lock().unwrap().is_empty());

        let store = FakeStore::with_todos(Vec::new(), EventLog::default());
        let request = Request::builder()
            .method("GET")
            .uri("/notify-users")
            .header("Authorization", "Bearer s3cret")
            .body(Body::empty())
            .unwrap();
        let (status, _) = call(app(store, false, Some("s3cret")), request).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn health_reports_store_backend() {
        let store = FakeStore::with_todos(Vec::new(), EventLog::default());
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(app(store, false, None), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["store"], "sqlite");
    }

    #[test]
    fn trigger_token_must_match_exactly() {
        assert!(verify_trigger_token("s3cret", "s3cret"));
        assert!(!verify_trigger_token("s3cres", "s3cret"));
        assert!(!verify_trigger_token("s3cret-longer", "s3cret"));
        assert!(!verify_trigger_token("", "s3cret"));
    }
}
