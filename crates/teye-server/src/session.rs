use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use teye_types::now_ms;

use crate::state::AppState;

/// `GET /session/{id}` — a read-only snapshot of a session row (spec §3, §6).
/// Unlike the rest of the error taxonomy, "no such session" isn't one of the
/// named error codes; it's a plain 404 since the id is a path parameter, not
/// a submitted payload to validate.
pub async fn get_session_handler(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.sessions.get(&id).await {
        Some(session) => Json(json!({
            "id": session.id,
            "tenantId": session.tenant_id,
            "userId": session.user_id,
            "language": session.language,
            "tokenBudget": session.token_budget,
            "createdAtMs": session.created_at_ms,
            "lastActivityMs": session.last_activity_ms,
            "ttlDeadlineMs": session.ttl_deadline_ms,
            "reclaimable": session.is_reclaimable(now_ms()),
        }))
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"ok": false, "code": "E_NOT_FOUND", "md": "session not found"})),
        )
            .into_response(),
    }
}
