use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::session::Language;

/// The session-scoped context carried alongside a work envelope. `session_id`
/// is optional on the wire — a missing id is filled in from the caller's
/// connection binding before validation runs (spec §4.1).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub budget: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

/// The payload submitted to the orchestrator. `work` keys are an open set —
/// unknown artifact kinds pass through untouched rather than being rejected,
/// per spec §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkEnvelope {
    pub intent: String,
    #[serde(default)]
    pub work: HashMap<String, String>,
    #[serde(default)]
    pub context_info: Map<String, Value>,
    #[serde(default)]
    pub reasoning_md: String,
    #[serde(default)]
    pub context: EnvelopeContext,
    #[serde(default)]
    pub strict_mode: bool,
}

/// Reserved key under which clarification answers are merged into
/// `context_info` (augment, not replace — see DESIGN.md's resolution of the
/// spec's open question on this point).
pub const CLARIFICATION_ANSWERS_KEY: &str = "clarification_answers";

impl WorkEnvelope {
    /// Merge clarification answers into `context_info` under the reserved
    /// key, appending to any answers already recorded there.
    pub fn with_clarification_answers(mut self, answers: Vec<ClarificationAnswer>) -> Self {
        let entry = self
            .context_info
            .entry(CLARIFICATION_ANSWERS_KEY.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(existing) = entry {
            existing.extend(answers.into_iter().map(|a| {
                serde_json::json!({"question": a.question, "answer": a.answer})
            }));
        }
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClarificationAnswer {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClarificationSubmission {
    pub answers: Vec<ClarificationAnswer>,
}

/// Reserved wrapper keys the MCP bridge's tool-call envelope carries that are
/// never forwarded to the orchestrator (spec §6, REDESIGN FLAGS). The set is
/// closed: unknown extra top-level keys on the wrapper are an error at decode
/// time rather than being silently dropped.
pub const MCP_RESERVED_KEYS: &[&str] = &["signal", "_meta", "requestId", "progressToken"];

#[derive(Debug, Clone, Deserialize)]
pub struct McpToolCallEnvelope {
    pub arguments: Value,
    #[serde(default)]
    pub signal: Option<Value>,
    #[serde(default, rename = "_meta")]
    pub meta: Option<Value>,
    #[serde(default, rename = "requestId")]
    pub request_id: Option<String>,
    #[serde(default, rename = "progressToken")]
    pub progress_token: Option<Value>,
}

impl McpToolCallEnvelope {
    /// Unwrap `arguments` into a `WorkEnvelope`. A missing `payload` becomes
    /// `{}` and a missing `context` is left `None` for the caller to fill in
    /// from the connection binding, per spec §6.
    pub fn into_work_envelope(self) -> Result<WorkEnvelope, serde_json::Error> {
        let mut arguments = self.arguments;
        if let Value::Object(ref mut map) = arguments {
            map.entry("work").or_insert_with(|| Value::Object(Map::new()));
        }
        serde_json::from_value(arguments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_envelope() -> WorkEnvelope {
        WorkEnvelope {
            intent: "review login".to_string(),
            work: HashMap::new(),
            context_info: Map::new(),
            reasoning_md: String::new(),
            context: EnvelopeContext::default(),
            strict_mode: false,
        }
    }

    #[test]
    fn clarification_answers_augment_not_replace() {
        let mut envelope = base_envelope();
        envelope
            .context_info
            .insert("lang".to_string(), json!("python"));
        let merged = envelope.with_clarification_answers(vec![ClarificationAnswer {
            question: "Which component?".to_string(),
            answer: "the login handler".to_string(),
        }]);
        assert_eq!(merged.context_info.get("lang"), Some(&json!("python")));
        let answers = merged
            .context_info
            .get(CLARIFICATION_ANSWERS_KEY)
            .and_then(|v| v.as_array())
            .expect("answers array");
        assert_eq!(answers.len(), 1);
    }

    #[test]
    fn mcp_envelope_defaults_missing_payload_to_empty_map() {
        let wrapper = McpToolCallEnvelope {
            arguments: json!({"intent": "test"}),
            signal: None,
            meta: None,
            request_id: None,
            progress_token: None,
        };
        let envelope = wrapper.into_work_envelope().expect("decode");
        assert_eq!(envelope.intent, "test");
        assert!(envelope.work.is_empty());
    }
}
