use axum::{extract::State, response::IntoResponse, Json};
use std::time::Duration;

use crate::app::AppState;

/// GET /health - liveness, never touches the session
pub(super) async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "model": state.config.upstream.model,
    }))
}

/// Check if a relay endpoint is answering at `base_url`
pub async fn is_relay_running(base_url: &str) -> bool {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(500))
        .build();

    if let Ok(client) = client {
        if let Ok(resp) = client
            .get(format!("{}/health", base_url.trim_end_matches('/')))
            .send()
            .await
        {
            return resp.status().is_success();
        }
    }

    false
}
