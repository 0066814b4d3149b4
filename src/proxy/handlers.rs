use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::app::AppState;
use crate::utils::GENERIC_FAILURE_MESSAGE;

/// Body of `POST /relay`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayRequest {
    pub prompt: String,
    /// Previous prompt held by the client, used only when the server has no history
    #[serde(default)]
    pub last_user_message: Option<String>,
}

/// Successful `POST /relay` reply
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayResponse {
    pub message: String,
    pub tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explorer_url: Option<String>,
}

/// Body of `POST /auth`
#[derive(Debug, Deserialize)]
pub struct AuthRequest {
    pub proof: String,
}

/// Every failure looks the same from outside
pub(super) fn failure() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": GENERIC_FAILURE_MESSAGE })),
    )
        .into_response()
}

/// POST /relay - run one turn
pub(super) async fn handle_relay(
    State(state): State<AppState>,
    body: Result<Json<RelayRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(e) => {
            warn!("Malformed relay request: {}", e);
            return failure();
        }
    };

    match state
        .session
        .submit_with_carryover(&request.prompt, request.last_user_message.as_deref())
        .await
    {
        Ok(turn) => {
            let response = RelayResponse {
                message: turn.assistant.content().to_string(),
                tokens: turn.assistant.tokens().unwrap_or(0),
                payment_ref: turn.assistant.payment_ref().map(str::to_string),
                explorer_url: state.explorer_link(&turn.assistant),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(kind) => {
            info!(kind = kind.label(), "Relay request failed");
            failure()
        }
    }
}

/// GET /auth - whether the session may submit
pub(super) async fn handle_auth_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({ "authenticated": state.session.is_authenticated() }))
}

/// POST /auth - present a payment proof
pub(super) async fn handle_authenticate(
    State(state): State<AppState>,
    body: Result<Json<AuthRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(e) => {
            warn!("Malformed auth request: {}", e);
            return failure();
        }
    };

    match state.session.authenticate(&request.proof) {
        Ok(()) => Json(serde_json::json!({ "authenticated": true })).into_response(),
        Err(_) => failure(),
    }
}

/// GET /session - the conversation as the presentation layer renders it
pub(super) async fn handle_session(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.session.snapshot();
    let status = state.session.status();
    Json(serde_json::json!({
        "log": snapshot.log,
        "status": status.label(),
        "lastPaymentRef": snapshot.last_payment_ref,
        "totalTokens": snapshot.log.total_tokens(),
    }))
}

/// POST /reset - drop the conversation and the persisted proof
pub(super) async fn handle_reset(State(state): State<AppState>) -> Response {
    match state.session.reset() {
        Ok(()) => Json(serde_json::json!({ "reset": true })).into_response(),
        Err(kind) => {
            info!(kind = kind.label(), "Reset rejected");
            failure()
        }
    }
}
