use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use teye_types::now_ms;

use crate::state::AppState;

/// `GET /health` — liveness only: the process is up and answering requests.
/// Never touches storage, providers, or Eyes (spec §4.8).
pub async fn liveness_handler() -> Json<serde_json::Value> {
    Json(json!({"ok": true, "status": "alive"}))
}

/// `GET /health/ready` — readiness: the provider registry can reach at least
/// one configured provider. Storage and the pipeline bus are in-process and
/// always available once the handler is running, so the only external
/// dependency worth probing is the LLM provider (spec §4.8).
pub async fn readiness_handler(State(state): State<AppState>) -> Response {
    let now = now_ms();
    let provider_check = match state.providers.select_provider(None).await {
        Ok(provider) => state.providers.health(&provider.info().id, now).await.map(|h| h.healthy),
        Err(_) => Ok(false),
    };

    match provider_check {
        Ok(true) => Json(json!({"ok": true, "status": "ready", "provider": true})).into_response(),
        Ok(false) | Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"ok": false, "status": "not_ready", "provider": false})),
        )
            .into_response(),
    }
}

/// `GET /metrics` — Prometheus text exposition (spec §4.8).
pub async fn metrics_handler() -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        teye_observability::render_metrics(),
    )
        .into_response()
}
