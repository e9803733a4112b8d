use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use keepsake_delivery::TokenError;
use serde_json::json;
use tracing::error;

use crate::app::AppState;

/// GET /view/{token}: redeem a delivery token.
///
/// 404 for malformed or unknown tokens, 410 once the token has expired.
pub async fn view_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Response {
    match state.executor.tokens().redeem(&token, Utc::now()) {
        Ok(message) => Json(message).into_response(),
        Err(TokenError::Malformed | TokenError::Unknown) => {
            error_body(StatusCode::NOT_FOUND, "not_found", "no message for this link")
        }
        Err(TokenError::Expired) => {
            error_body(StatusCode::GONE, "expired", "this link has expired")
        }
        Err(TokenError::Store(e)) => {
            error!(error = %e, "redemption lookup failed");
            error_body(
                StatusCode::INTERNAL_SERVER_ERROR,
                "unavailable",
                "please try again later",
            )
        }
    }
}

fn error_body(status: StatusCode, code: &str, message: &str) -> Response {
    (status, Json(json!({ "error": code, "message": message }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use chrono::Duration;
    use keepsake_core::types::{Message, MessageStatus, Recipient, Trigger};
    use keepsake_core::KeepsakeConfig;
    use keepsake_delivery::ReleaseExecutor;
    use keepsake_notify::LogDispatcher;
    use keepsake_store::{SqliteStore, Store};
    use tower::ServiceExt;

    use crate::app::build_router;

    fn state_with_link() -> (Arc<AppState>, Arc<SqliteStore>, String) {
        let config = KeepsakeConfig::default();
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store
            .insert_recipient(&Recipient {
                id: "r1".into(),
                user_id: "u1".into(),
                name: "Ana".into(),
                email: Some("ana@example.com".into()),
                relationship: None,
            })
            .unwrap();
        store
            .insert_message(&Message {
                id: "m1".into(),
                user_id: "u1".into(),
                title: "Hello".into(),
                body: "for you".into(),
                attachments: vec!["photos/1.jpg".into()],
                created_at: Utc::now(),
                status: MessageStatus::Sent,
                trigger: Trigger::Manual,
                release_date: None,
                release_event: None,
                sent_at: Some(Utc::now()),
            })
            .unwrap();
        let link = store.link_recipient("m1", "r1").unwrap();
        let executor = Arc::new(ReleaseExecutor::new(
            store.clone(),
            Arc::new(LogDispatcher::new()),
            config.delivery.clone(),
        ));
        (Arc::new(AppState::new(config, executor)), store, link)
    }

    async fn get(state: Arc<AppState>, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = build_router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn valid_token_returns_message() {
        let (state, store, link) = state_with_link();
        let token = "a".repeat(64);
        store
            .upsert_token(&link, &token, Utc::now() + Duration::days(7))
            .unwrap();

        let (status, body) = get(state, &format!("/view/{token}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], "Hello");
        assert_eq!(body["attachments"][0], "photos/1.jpg");
        assert_eq!(body["recipient_name"], "Ana");
    }

    #[tokio::test]
    async fn expired_token_is_gone() {
        let (state, store, link) = state_with_link();
        let token = "b".repeat(64);
        store
            .upsert_token(&link, &token, Utc::now() - Duration::minutes(1))
            .unwrap();

        let (status, body) = get(state, &format!("/view/{token}")).await;
        assert_eq!(status, StatusCode::GONE);
        assert_eq!(body["error"], "expired");
    }

    #[tokio::test]
    async fn unknown_and_malformed_tokens_are_not_found() {
        let (state, _, _) = state_with_link();
        let (status, _) = get(state.clone(), &format!("/view/{}", "c".repeat(64))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = get(state, "/view/short").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (state, _, _) = state_with_link();
        let (status, body) = get(state, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }
}
