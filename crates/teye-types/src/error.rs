use serde_json::{json, Value};
use thiserror::Error;

/// The unified error taxonomy from spec §7. Each variant knows its own HTTP
/// status (via `status_code`) and surface code (via `code`); `teye-server`
/// converts this into the JSON response shape, but the mapping itself lives
/// here so every caller — HTTP handlers, tests, the orchestrator — agrees on
/// what a given failure means without re-deriving it.
#[derive(Debug, Error, Clone)]
pub enum TeyeError {
    #[error("schema validation failed: {field} — {hint}")]
    BadPayloadSchema { field: String, hint: String },

    #[error("authentication required")]
    AuthRequired,

    #[error("csrf validation failed")]
    CsrfFailed,

    #[error("quota exceeded for tenant {tenant_id}, retry after {retry_after_secs}s")]
    QuotaExceeded {
        tenant_id: String,
        retry_after_secs: u64,
    },

    #[error("admin session expired")]
    SessionExpired,

    #[error("llm routing or provider call failed: {detail}")]
    LlmError { detail: String },

    #[error("orchestration failed mid-pipeline")]
    OrchestrationFailed {
        partial_results: Value,
        completed_validations: Vec<String>,
    },

    #[error("internal error: {detail}")]
    Internal { detail: String },
}

impl TeyeError {
    pub fn code(&self) -> &'static str {
        match self {
            TeyeError::BadPayloadSchema { .. } => "E_BAD_PAYLOAD_SCHEMA",
            TeyeError::AuthRequired => "E_AUTH_REQUIRED",
            TeyeError::CsrfFailed => "E_CSRF_FAILED",
            TeyeError::QuotaExceeded { .. } => "E_QUOTA_EXCEEDED",
            TeyeError::SessionExpired => "E_SESSION_EXPIRED",
            TeyeError::LlmError { .. } => "E_LLM_ERROR",
            TeyeError::OrchestrationFailed { .. } => "E_ORCHESTRATION_FAILED",
            TeyeError::Internal { .. } => "E_INTERNAL",
        }
    }

    /// HTTP status per the taxonomy table. `E_ORCHESTRATION_FAILED` is 200
    /// with `ok=false` in the body — it's a domain-level failure carried in
    /// a successful response, not a transport error.
    pub fn status_code(&self) -> u16 {
        match self {
            TeyeError::BadPayloadSchema { .. } => 400,
            TeyeError::AuthRequired => 401,
            TeyeError::CsrfFailed => 403,
            TeyeError::QuotaExceeded { .. } => 429,
            TeyeError::SessionExpired => 401,
            TeyeError::LlmError { .. } => 503,
            TeyeError::OrchestrationFailed { .. } => 200,
            TeyeError::Internal { .. } => 500,
        }
    }

    pub fn recovery_hint(&self) -> String {
        match self {
            TeyeError::BadPayloadSchema { field, hint } => {
                format!("field `{field}` failed validation: {hint}")
            }
            TeyeError::AuthRequired => "supply a valid X-API-Key header".to_string(),
            TeyeError::CsrfFailed => {
                "re-fetch a CSRF token and resend the X-CSRF-Token header".to_string()
            }
            TeyeError::QuotaExceeded {
                retry_after_secs, ..
            } => format!("wait {retry_after_secs} seconds and retry"),
            TeyeError::SessionExpired => "re-authenticate via /admin/auth/login".to_string(),
            TeyeError::LlmError { .. } => {
                "provider unreachable or routing decision failed; invoke Eyes directly".to_string()
            }
            TeyeError::OrchestrationFailed { .. } => {
                "inspect data.partial_results and data.completed_validations".to_string()
            }
            TeyeError::Internal { .. } => "retry; if persistent, contact the operator".to_string(),
        }
    }

    /// JSON body shape shared by every error response:
    /// `{ok, code, md, data}`.
    pub fn to_response_body(&self) -> Value {
        let mut data = json!({});
        if let TeyeError::OrchestrationFailed {
            partial_results,
            completed_validations,
        } = self
        {
            data = json!({
                "partial_results": partial_results,
                "completed_validations": completed_validations,
            });
        }
        json!({
            "ok": false,
            "code": self.code(),
            "md": format!("{self}\n\nhint: {}", self.recovery_hint()),
            "data": data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_payload_schema_maps_to_400() {
        let err = TeyeError::BadPayloadSchema {
            field: "reasoning_md".to_string(),
            hint: "must be at least 10 characters".to_string(),
        };
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.code(), "E_BAD_PAYLOAD_SCHEMA");
    }

    #[test]
    fn orchestration_failed_is_200_with_partial_results() {
        let err = TeyeError::OrchestrationFailed {
            partial_results: json!({"ambiguity_detector": {"ok": true}}),
            completed_validations: vec!["ambiguity_detector".to_string()],
        };
        assert_eq!(err.status_code(), 200);
        let body = err.to_response_body();
        assert_eq!(body["ok"], json!(false));
        assert_eq!(
            body["data"]["completed_validations"],
            json!(["ambiguity_detector"])
        );
    }
}
