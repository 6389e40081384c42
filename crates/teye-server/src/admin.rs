use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use teye_auth::{hash_secret, verify_secret, ApiKeySummary};
use teye_core::AuditEvent;
use teye_types::{now_ms, ApiKey, ApiKeyLimits, Role, TenantQuota, TeyeError};

use crate::error_response::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// `POST /admin/auth/login` (spec §4.7). Credentials are checked against an
/// operator-provisioned record at config paths `admin.email` /
/// `admin.passwordHash` (the hash produced the same way an API key secret
/// is hashed) — verifying them against some external identity provider is
/// out of scope for this service, per spec §9's open question on that point.
/// On success this mints a fresh admin-role API key, an admin session, and
/// a CSRF token, and sets both as cookies.
pub async fn login_handler(State(state): State<AppState>, Json(body): Json<LoginRequest>) -> Result<Response, ApiError> {
    let configured_email = state.config.get_path("admin.email").await.and_then(|v| v.as_str().map(str::to_string));
    let configured_hash = state.config.get_path("admin.passwordHash").await.and_then(|v| v.as_str().map(str::to_string));

    let (Some(configured_email), Some(configured_hash)) = (configured_email, configured_hash) else {
        return Err(TeyeError::AuthRequired.into());
    };
    if configured_email != body.email || !verify_secret(&configured_hash, &body.password) {
        return Err(TeyeError::AuthRequired.into());
    }

    let now = now_ms();
    let (key, raw_secret) = new_api_key(Role::Admin, None, ApiKeyLimits::default())
        .map_err(|e| TeyeError::Internal { detail: e.to_string() })?;
    state
        .storage
        .put_api_key(key.clone())
        .await
        .map_err(|e| TeyeError::Internal { detail: e.to_string() })?;

    let (session_id, session) = state
        .admin_sessions
        .create(&key.id, now)
        .await
        .map_err(|e| TeyeError::Internal { detail: e.to_string() })?;

    let _ = state
        .storage
        .append_audit_event(AuditEvent {
            id: Uuid::new_v4().to_string(),
            ts_ms: now,
            actor: key.id.clone(),
            action: "admin_login".to_string(),
            detail: json!({"email": body.email}),
        })
        .await;

    let mut response = Json(json!({
        "apiKeyId": key.id,
        "apiKey": format!("{}.{}", key.id, raw_secret),
        "csrfToken": session.csrf_token,
    }))
    .into_response();

    let headers = response.headers_mut();
    headers.append(
        header::SET_COOKIE,
        cookie_header("teye_admin_session", &session_id),
    );
    headers.append(header::SET_COOKIE, cookie_header("teye_csrf", &session.csrf_token));

    Ok(response)
}

fn cookie_header(name: &str, value: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("{name}={value}; HttpOnly; Secure; SameSite=Strict; Path=/"))
        .unwrap_or_else(|_| HeaderValue::from_static(""))
}

fn new_api_key(role: Role, tenant_id: Option<String>, limits: ApiKeyLimits) -> anyhow::Result<(ApiKey, String)> {
    let secret = Uuid::new_v4().to_string();
    let key = ApiKey {
        id: Uuid::new_v4().to_string(),
        secret_hash: hash_secret(&secret)?,
        role,
        tenant_id,
        created_at_ms: now_ms(),
        expires_at_ms: None,
        revoked: false,
        limits,
    };
    Ok((key, secret))
}

fn require_admin(auth: &ApiKey) -> Result<(), ApiError> {
    if auth.role == Role::Admin {
        Ok(())
    } else {
        Err(TeyeError::AuthRequired.into())
    }
}

/// `GET /admin/api-keys`
pub async fn list_api_keys_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<ApiKey>,
) -> Result<Json<Vec<ApiKeySummary>>, ApiError> {
    require_admin(&auth)?;
    let keys = state.storage.list_api_keys().await;
    Ok(Json(keys.iter().map(ApiKeySummary::from).collect()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApiKeyRequest {
    pub role: Role,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub limits: ApiKeyLimits,
    #[serde(default)]
    pub expires_at_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApiKeyResponse {
    pub id: String,
    pub api_key: String,
}

/// `POST /admin/api-keys` — the raw secret is returned exactly once, here;
/// it is never recoverable afterwards (spec §3, §4.7).
pub async fn create_api_key_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<ApiKey>,
    Json(body): Json<CreateApiKeyRequest>,
) -> Result<Json<CreateApiKeyResponse>, ApiError> {
    require_admin(&auth)?;
    let (mut key, raw_secret) =
        new_api_key(body.role, body.tenant_id, body.limits).map_err(|e| TeyeError::Internal { detail: e.to_string() })?;
    key.expires_at_ms = body.expires_at_ms;

    state
        .storage
        .put_api_key(key.clone())
        .await
        .map_err(|e| TeyeError::Internal { detail: e.to_string() })?;

    Ok(Json(CreateApiKeyResponse {
        id: key.id.clone(),
        api_key: format!("{}.{}", key.id, raw_secret),
    }))
}

/// `DELETE /admin/api-keys/{id}`
pub async fn revoke_api_key_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<ApiKey>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    require_admin(&auth)?;
    let revoked = state
        .storage
        .revoke_api_key(&id)
        .await
        .map_err(|e| TeyeError::Internal { detail: e.to_string() })?;
    if revoked {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Ok(StatusCode::NOT_FOUND)
    }
}

/// `GET /admin/tenants/{id}/quota`
pub async fn get_tenant_quota_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<ApiKey>,
    Path(tenant_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_admin(&auth)?;
    let now = now_ms();
    let usage = state.quotas.get_usage(&tenant_id, now).await;
    let limit = state
        .storage
        .get_tenant_quota(&tenant_id)
        .await
        .map(|q| q.limit);
    Ok(Json(json!({"tenantId": tenant_id, "usage": usage, "limit": limit})))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetTenantQuotaRequest {
    pub limit: u32,
}

/// `PUT /admin/tenants/{id}/quota` — persists the new limit and applies it to
/// the live `QuotaManager` immediately, without waiting for a restart (spec
/// §4.5, §4.7).
pub async fn set_tenant_quota_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<ApiKey>,
    Path(tenant_id): Path<String>,
    Json(body): Json<SetTenantQuotaRequest>,
) -> Result<Json<TenantQuota>, ApiError> {
    require_admin(&auth)?;
    let quota = TenantQuota {
        tenant_id: tenant_id.clone(),
        limit: body.limit,
    };
    state
        .storage
        .put_tenant_quota(quota.clone())
        .await
        .map_err(|e| TeyeError::Internal { detail: e.to_string() })?;
    state.quotas.apply_quota(quota.clone()).await;
    Ok(Json(quota))
}
