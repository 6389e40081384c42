use axum::middleware as axum_middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::middleware::{auth_gate, csrf_gate, quota_gate};
use crate::state::AppState;
use crate::{admin, health, orchestrate, session, ws};

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/validate", post(orchestrate::orchestrate_handler))
        .route("/eyes/overseer/orchestrate", post(orchestrate::orchestrate_handler))
        .route("/session/{id}", get(session::get_session_handler))
        .route(
            "/session/{id}/clarifications",
            post(orchestrate::submit_clarifications_handler),
        )
        .route("/ws/pipeline/{session_id}", get(ws::pipeline_ws_handler))
        .route("/admin/auth/login", post(admin::login_handler))
        .route("/admin/api-keys", get(admin::list_api_keys_handler).post(admin::create_api_key_handler))
        .route("/admin/api-keys/{id}", delete(admin::revoke_api_key_handler))
        .route(
            "/admin/tenants/{id}/quota",
            get(admin::get_tenant_quota_handler).put(admin::set_tenant_quota_handler),
        )
        .route("/health", get(health::liveness_handler))
        .route("/health/ready", get(health::readiness_handler))
        .route("/metrics", get(health::metrics_handler))
        .layer(axum_middleware::from_fn_with_state(state.clone(), csrf_gate))
        .layer(axum_middleware::from_fn_with_state(state.clone(), quota_gate))
        .layer(axum_middleware::from_fn_with_state(state.clone(), auth_gate))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
