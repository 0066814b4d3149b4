use anyhow::{Context, Result};
use axum::{
    error_handling::HandleErrorLayer,
    extract::DefaultBodyLimit,
    response::Response,
    routing::{get, post},
    BoxError, Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::handlers::{
    failure, handle_auth_status, handle_authenticate, handle_relay, handle_reset, handle_session,
};
use super::health::handle_health;
use crate::app::AppState;
use crate::constants::SERVER_TIMEOUT_MARGIN_SECS;

/// Build the relay endpoint's routes
///
/// Requests are cut off a margin after the upstream timeout, so a relay call
/// normally resolves on its own first.
pub fn router(state: AppState) -> Router {
    let max_body = state.config.server.max_body_bytes;
    let request_timeout = Duration::from_secs(
        state
            .config
            .upstream
            .timeout_secs
            .saturating_add(SERVER_TIMEOUT_MARGIN_SECS),
    );

    Router::new()
        .route("/health", get(handle_health))
        .route("/relay", post(handle_relay))
        .route("/auth", get(handle_auth_status).post(handle_authenticate))
        .route("/session", get(handle_session))
        .route("/reset", post(handle_reset))
        // Oversized bodies surface as extractor rejections, which map to 500
        .layer(DefaultBodyLimit::max(max_body))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_middleware_error))
                .timeout(request_timeout),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the relay endpoint until Ctrl-C
pub async fn serve(state: AppState) -> Result<()> {
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind relay endpoint to {}", addr))?;

    info!("Relay endpoint listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Relay endpoint stopped unexpectedly")?;

    info!("Relay endpoint shut down");
    Ok(())
}

/// Timeouts and other middleware errors get the same generic 500
async fn handle_middleware_error(err: BoxError) -> Response {
    warn!("Request aborted by middleware: {}", err);
    failure()
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::Config;
    use crate::relay::{MockRelay, Relay, RelayReply};
    use crate::runtime::ConversationSession;
    use crate::session::{ContextAssembler, ContextMessage, Role, SessionStore};
    use crate::utils::{ErrorKind, GENERIC_FAILURE_MESSAGE};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    const PROOF: &str = "handcash-proof-0001";

    fn app_with(relay: MockRelay) -> Router {
        app_with_config(Arc::new(relay), Config::default())
    }

    fn app_with_config(relay: Arc<dyn Relay>, config: Config) -> Router {
        let session = ConversationSession::new(
            relay,
            ContextAssembler::new("You are helpful.", 1, 4),
            SessionStore::in_memory(),
        );
        router(AppState::new(config, session))
    }

    /// Never answers within any reasonable deadline
    struct StalledRelay;

    #[async_trait]
    impl Relay for StalledRelay {
        async fn send(&self, _messages: &[ContextMessage]) -> Result<RelayReply, ErrorKind> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(ErrorKind::Transport("timed out".to_string()))
        }

        fn name(&self) -> &str {
            "stalled"
        }
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn test_health_is_ok() {
        let app = app_with(MockRelay::new());
        let (status, body) = call(&app, get_request("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_relay_requires_authentication() {
        let mut relay = MockRelay::new();
        relay.expect_send().times(0);
        let app = app_with(relay);

        let (status, body) = call(&app, post_json("/relay", json!({"prompt": "hello"}))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"error": GENERIC_FAILURE_MESSAGE}));
    }

    #[tokio::test]
    async fn test_authenticated_relay_returns_reply() {
        let mut relay = MockRelay::new();
        relay.expect_send().times(1).returning(|_| {
            Ok(RelayReply {
                content: "Hi there".to_string(),
                tokens: 13,
                payment_ref: Some("abc123".to_string()),
            })
        });
        let app = app_with(relay);

        let (status, _) = call(&app, post_json("/auth", json!({"proof": PROOF}))).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = call(&app, get_request("/auth")).await;
        assert_eq!(body, json!({"authenticated": true}));

        let (status, body) = call(&app, post_json("/relay", json!({"prompt": "hello"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Hi there");
        assert_eq!(body["tokens"], 13);
        assert_eq!(body["paymentRef"], "abc123");
        assert_eq!(body["explorerUrl"], "https://whatsonchain.com/tx/abc123");

        let (_, body) = call(&app, get_request("/session")).await;
        assert_eq!(body["log"].as_array().map(Vec::len), Some(2));
        assert_eq!(body["status"], "idle");
        assert_eq!(body["totalTokens"], 13);
    }

    #[tokio::test]
    async fn test_upstream_detail_never_leaks() {
        let mut relay = MockRelay::new();
        relay
            .expect_send()
            .returning(|_| Err(ErrorKind::Upstream("invalid_api_key: sk-secret".into())));
        let app = app_with(relay);
        call(&app, post_json("/auth", json!({"proof": PROOF}))).await;

        let (status, body) = call(&app, post_json("/relay", json!({"prompt": "hello"}))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.to_string().contains("sk-secret"));
        assert_eq!(body["error"], GENERIC_FAILURE_MESSAGE);
    }

    #[tokio::test]
    async fn test_last_user_message_seeds_empty_history() {
        let mut relay = MockRelay::new();
        relay
            .expect_send()
            .times(1)
            .withf(|messages: &[ContextMessage]| {
                messages
                    == [
                        ContextMessage::new(Role::System, "You are helpful."),
                        ContextMessage::new(Role::User, "earlier question"),
                        ContextMessage::new(Role::User, "follow up"),
                    ]
            })
            .returning(|_| {
                Ok(RelayReply {
                    content: "answer".to_string(),
                    tokens: 0,
                    payment_ref: None,
                })
            });
        let app = app_with(relay);
        call(&app, post_json("/auth", json!({"proof": PROOF}))).await;

        let (status, body) = call(
            &app,
            post_json(
                "/relay",
                json!({"prompt": "follow up", "lastUserMessage": "earlier question"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.get("paymentRef").is_none());
    }

    #[tokio::test]
    async fn test_malformed_bodies_are_generic_failures() {
        let app = app_with(MockRelay::new());

        let request = Request::builder()
            .method("POST")
            .uri("/relay")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = call(&app, request).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], GENERIC_FAILURE_MESSAGE);

        let (status, _) = call(&app, post_json("/auth", json!({"proof": "no"}))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_reset_revokes_access() {
        let app = app_with(MockRelay::new());
        call(&app, post_json("/auth", json!({"proof": PROOF}))).await;

        let (status, body) = call(&app, post_json("/reset", json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reset"], true);

        let (_, body) = call(&app, get_request("/auth")).await;
        assert_eq!(body["authenticated"], false);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_timeout_is_generic_failure() {
        let mut config = Config::default();
        config.upstream.timeout_secs = 120;
        let app = app_with_config(Arc::new(StalledRelay), config);
        call(&app, post_json("/auth", json!({"proof": PROOF}))).await;

        let (status, body) = call(&app, post_json("/relay", json!({"prompt": "hello"}))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"error": GENERIC_FAILURE_MESSAGE}));
    }
}
