use axum::extract::{Request, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;

use teye_auth::api_key;
use teye_types::{now_ms, ApiKey, Role, TeyeError};

use crate::error_response::ApiError;
use crate::state::AppState;

/// Paths that never require `X-API-Key`, either because they exist to
/// bootstrap auth itself (`/admin/auth/login`) or because they are liveness
/// surfaces a load balancer probes before any credential exists (spec §6,
/// §4.8 readiness).
const PUBLIC_PATHS: &[&str] = &["/health", "/health/ready", "/metrics", "/admin/auth/login"];

/// `X-API-Key: <id>.<secret>` — the id names the stored record (so lookup is
/// O(1) rather than a scan over every key's salted hash), the secret is
/// verified against that record's hash (spec §4.7).
fn parse_api_key_header(headers: &HeaderMap) -> Option<(String, String)> {
    let raw = headers.get("x-api-key")?.to_str().ok()?.trim();
    let (id, secret) = raw.split_once('.')?;
    if id.is_empty() || secret.is_empty() {
        return None;
    }
    Some((id.to_string(), secret.to_string()))
}

/// Same `<id>.<secret>` shape, carried in the WebSocket subprotocol instead
/// of a header since browsers cannot set arbitrary headers on the upgrade
/// request (spec §6: `subprotocol api-key-<key>`).
pub fn parse_api_key_subprotocol(value: &str) -> Option<(String, String)> {
    let key = value.strip_prefix("api-key-")?;
    let (id, secret) = key.split_once('.')?;
    if id.is_empty() || secret.is_empty() {
        return None;
    }
    Some((id.to_string(), secret.to_string()))
}

/// Looks the key up by id and authenticates the secret against its stored
/// hash, rejecting revoked or expired keys regardless of whether the secret
/// matches (spec §3's API Key invariants).
pub async fn authenticate_key(state: &AppState, id: &str, secret: &str) -> Option<ApiKey> {
    let key = state.storage.get_api_key(id).await?;
    let now = now_ms();
    if api_key::authenticate(&key, secret, now) {
        Some(key)
    } else {
        None
    }
}

/// Validates `X-API-Key` on every request except the public paths above,
/// and stashes the resolved `ApiKey` as a request extension for downstream
/// handlers and the quota middleware (spec §4.7, §7 `E_AUTH_REQUIRED`).
pub async fn auth_gate(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        return next.run(request).await;
    }
    let path = request.uri().path();
    if PUBLIC_PATHS.iter().any(|p| path == *p) {
        return next.run(request).await;
    }
    // The WS upgrade can't carry `X-API-Key` (no custom headers on a browser
    // upgrade request); it authenticates via the `Sec-WebSocket-Protocol`
    // subprotocol inside `ws::pipeline_ws_handler` itself (spec §6).
    if path.starts_with("/ws/pipeline/") {
        return next.run(request).await;
    }

    let Some((id, secret)) = parse_api_key_header(request.headers()) else {
        return ApiError(TeyeError::AuthRequired).into_response();
    };

    match authenticate_key(&state, &id, &secret).await {
        Some(key) => {
            request.extensions_mut().insert(key);
            next.run(request).await
        }
        None => ApiError(TeyeError::AuthRequired).into_response(),
    }
}

/// Runs after `auth_gate` on any route carrying a tenant-scoped request:
/// tenant quota is checked before the key's own per-minute limit (spec
/// §4.5 invariant iii — tenant precedence), and only a consumer-facing
/// request consumes quota at all; admin mutators are not rate-limited this
/// way.
pub async fn quota_gate(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        return next.run(request).await;
    }
    let Some(key) = request.extensions().get::<ApiKey>().cloned() else {
        return next.run(request).await;
    };
    if key.role == Role::Admin {
        return next.run(request).await;
    }

    let now = now_ms();
    let tenant_id = key.tenant_id.clone().unwrap_or_else(|| "default".to_string());
    let tenant_decision = state.quotas.check_and_increment(&tenant_id, now).await;
    if !tenant_decision.admitted {
        teye_observability::QUOTA_REJECTIONS
            .with_label_values(&[tenant_id.as_str()])
            .inc();
        return ApiError(TeyeError::QuotaExceeded {
            tenant_id,
            retry_after_secs: 60,
        })
        .into_response();
    }

    if let Some(per_minute) = key.limits.per_minute {
        let key_bucket = format!("key:{}", key.id);
        state.quotas.set_limit(key_bucket.clone(), per_minute).await;
        let key_decision = state.quotas.check_and_increment(&key_bucket, now).await;
        if !key_decision.admitted {
            return ApiError(TeyeError::QuotaExceeded {
                tenant_id,
                retry_after_secs: 60,
            })
            .into_response();
        }
    }

    next.run(request).await
}

/// Double-submit CSRF enforcement for admin mutators (spec §4.7, §8). Reads
/// the session id and CSRF value from cookies, the presented token from
/// `X-CSRF-Token`, and requires all three to agree before delegating to the
/// `AdminSessionManager`'s HMAC + timestamp validation.
pub async fn csrf_gate(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let method = request.method().clone();
    if !matches!(method, Method::POST | Method::PUT | Method::PATCH | Method::DELETE) {
        return next.run(request).await;
    }
    if request.uri().path() == "/admin/auth/login" {
        return next.run(request).await;
    }
    if !request.uri().path().starts_with("/admin") {
        return next.run(request).await;
    }

    let headers = request.headers().clone();
    let now = now_ms();

    let session_id = get_cookie(&headers, "teye_admin_session");
    let cookie_token = get_cookie(&headers, "teye_csrf");
    let header_token = headers
        .get("x-csrf-token")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let Some(session_id) = session_id else {
        return session_expired();
    };
    // Session validity is checked before token comparison so an absent or
    // expired session always reports as `E_SESSION_EXPIRED` (re-login), never
    // `E_CSRF_FAILED`; the two mean different things to a caller.
    if state.admin_sessions.get_valid(&session_id, now).await.is_none() {
        return session_expired();
    }

    let (Some(cookie_token), Some(header_token)) = (cookie_token, header_token) else {
        return csrf_failed();
    };

    if cookie_token != header_token {
        return csrf_failed();
    }

    if !state.admin_sessions.validate_csrf(&session_id, &header_token, now).await {
        return csrf_failed();
    }

    state.admin_sessions.touch(&session_id, now).await;
    next.run(request).await
}

fn csrf_failed() -> Response {
    let err = TeyeError::CsrfFailed;
    (
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::FORBIDDEN),
        Json(err.to_response_body()),
    )
        .into_response()
}

fn session_expired() -> Response {
    let err = TeyeError::SessionExpired;
    (
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::UNAUTHORIZED),
        Json(err.to_response_body()),
    )
        .into_response()
}

/// Parses the raw `Cookie` header (`a=1; b=2`) for a single named value.
/// There is no cookie-jar dependency in this stack — the shape is simple
/// enough that hand parsing is clearer than pulling one in for two call
/// sites.
pub fn get_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|pair| {
        let pair = pair.trim();
        let (key, value) = pair.split_once('=')?;
        if key == name {
            Some(value.to_string())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_api_key_subprotocol() {
        let parsed = parse_api_key_subprotocol("api-key-k1.secret123");
        assert_eq!(parsed, Some(("k1".to_string(), "secret123".to_string())));
    }

    #[test]
    fn rejects_subprotocol_missing_the_prefix() {
        assert!(parse_api_key_subprotocol("k1.secret123").is_none());
    }

    #[test]
    fn cookie_lookup_finds_named_value_among_several() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            "a=1; teye_csrf=abc123; b=2".parse().unwrap(),
        );
        assert_eq!(get_cookie(&headers, "teye_csrf"), Some("abc123".to_string()));
        assert_eq!(get_cookie(&headers, "missing"), None);
    }
}
