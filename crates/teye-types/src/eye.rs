use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A validator's output. `ok: None` models the in-flight state published on
/// the pipeline bus before an Eye completes (spec §3); a completed Eye always
/// publishes `Some(bool)`. Results are immutable once published — callers get
/// owned clones, never a handle into the orchestrator's working state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EyeResult {
    pub ok: Option<bool>,
    pub code: String,
    pub md: String,
    #[serde(default)]
    pub data: Value,
}

impl EyeResult {
    pub fn in_flight(eye_name: &str) -> Self {
        Self {
            ok: None,
            code: "IN_FLIGHT".to_string(),
            md: format!("{eye_name} is running"),
            data: Value::Null,
        }
    }

    pub fn success(code: impl Into<String>, md: impl Into<String>, data: Value) -> Self {
        Self {
            ok: Some(true),
            code: code.into(),
            md: md.into(),
            data,
        }
    }

    pub fn failure(code: impl Into<String>, md: impl Into<String>, data: Value) -> Self {
        Self {
            ok: Some(false),
            code: code.into(),
            md: md.into(),
            data,
        }
    }

    /// Numeric confidence, when the Eye reports one under `data.confidence`.
    /// Used by the Overseer to compute the orchestration-wide mean (spec
    /// §4.1).
    pub fn confidence(&self) -> Option<f64> {
        self.data.get("confidence").and_then(Value::as_f64)
    }
}

/// Outcome codes the Overseer treats specially. Everything else is an
/// ordinary Eye-defined code that just gets surfaced.
pub const CODE_CLARIFY: &str = "CLARIFY";
pub const CODE_REVISION_REQUIRED: &str = "REVISION_REQUIRED";

pub fn is_clarification_required(code: &str) -> bool {
    code == CODE_CLARIFY
}

pub fn is_revision_required(code: &str) -> bool {
    code == CODE_REVISION_REQUIRED
}

/// Static capability record returned by `Eye::describe`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EyeDescriptor {
    pub name: String,
    pub version: String,
    pub accepts_work_kinds: Vec<String>,
    pub returns_clarifications: bool,
}

/// A single clarification question surfaced by an Eye that short-circuits
/// the pipeline (spec §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClarificationQuestion {
    pub question: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn confidence_reads_from_data_payload() {
        let result = EyeResult::success("OK", "looks fine", json!({"confidence": 0.8}));
        assert_eq!(result.confidence(), Some(0.8));
    }

    #[test]
    fn confidence_absent_when_not_reported() {
        let result = EyeResult::success("OK", "looks fine", json!({}));
        assert_eq!(result.confidence(), None);
    }

    #[test]
    fn clarification_code_recognized() {
        assert!(is_clarification_required(CODE_CLARIFY));
        assert!(!is_clarification_required("OK_ALL"));
    }
}
