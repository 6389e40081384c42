use teye_types::WorkEnvelope;

/// Schema validation failures the server turns into
/// `TeyeError::BadPayloadSchema`. Kept separate from that type so this crate
/// doesn't need to depend on `teye-server`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub hint: String,
}

/// Minimum `intent` length required once `strict_mode` is set (spec §8).
const STRICT_MIN_INTENT_CHARS: usize = 5;
/// Minimum `reasoning_md` length required once `strict_mode` is set.
const STRICT_MIN_REASONING_CHARS: usize = 10;

/// Strict mode rejects envelopes a relaxed caller would be allowed to submit
/// (spec §8): in relaxed mode only a non-empty `intent` is required; in
/// strict mode `intent` must also reach the minimum length and both `work`
/// and `context_info` must carry at least one entry, on top of the
/// `reasoning_md` minimum length. Outside strict mode the weaker versions of
/// these checks are left for individual Eyes (e.g. `ambiguity_detector`) to
/// flag as a soft `CLARIFY` result instead of rejecting the request
/// outright.
pub fn validate_envelope(envelope: &WorkEnvelope) -> Result<(), ValidationError> {
    if envelope.intent.trim().is_empty() {
        return Err(ValidationError {
            field: "intent".to_string(),
            hint: "intent must not be empty".to_string(),
        });
    }

    if envelope.strict_mode {
        if envelope.intent.trim().chars().count() < STRICT_MIN_INTENT_CHARS {
            return Err(ValidationError {
                field: "intent".to_string(),
                hint: format!("intent must be at least {STRICT_MIN_INTENT_CHARS} characters in strict mode"),
            });
        }
        if envelope.work.is_empty() {
            return Err(ValidationError {
                field: "work".to_string(),
                hint: "work must contain at least one artifact in strict mode".to_string(),
            });
        }
        if envelope.context_info.is_empty() {
            return Err(ValidationError {
                field: "context_info".to_string(),
                hint: "context_info must contain at least one entry in strict mode".to_string(),
            });
        }
        if envelope.reasoning_md.trim().chars().count() < STRICT_MIN_REASONING_CHARS {
            return Err(ValidationError {
                field: "reasoning_md".to_string(),
                hint: format!(
                    "reasoning_md must be at least {STRICT_MIN_REASONING_CHARS} characters in strict mode"
                ),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};
    use std::collections::HashMap;

    fn envelope(intent: &str, reasoning: &str, work: HashMap<String, String>, strict: bool) -> WorkEnvelope {
        WorkEnvelope {
            intent: intent.to_string(),
            work,
            context_info: Default::default(),
            reasoning_md: reasoning.to_string(),
            context: Default::default(),
            strict_mode: strict,
        }
    }

    fn strict_ready_envelope() -> WorkEnvelope {
        let mut work = HashMap::new();
        work.insert("code".to_string(), "def login(): pass".to_string());
        let mut context_info = Map::new();
        context_info.insert("lang".to_string(), json!("python"));
        WorkEnvelope {
            intent: "Review my login endpoint".to_string(),
            work,
            context_info,
            reasoning_md: "This change updates the login handler thoroughly.".to_string(),
            context: Default::default(),
            strict_mode: true,
        }
    }

    #[test]
    fn empty_intent_always_rejected() {
        let result = validate_envelope(&envelope("", "", HashMap::new(), false));
        assert_eq!(result.unwrap_err().field, "intent");
    }

    #[test]
    fn short_reasoning_passes_outside_strict_mode() {
        let result = validate_envelope(&envelope("do it", "hi", HashMap::new(), false));
        assert!(result.is_ok());
    }

    #[test]
    fn short_intent_rejected_in_strict_mode() {
        let mut envelope = strict_ready_envelope();
        envelope.intent = "hi".to_string();
        let result = validate_envelope(&envelope);
        assert_eq!(result.unwrap_err().field, "intent");
    }

    #[test]
    fn empty_work_rejected_in_strict_mode_even_with_good_reasoning() {
        let mut envelope = strict_ready_envelope();
        envelope.work = HashMap::new();
        let result = validate_envelope(&envelope);
        assert_eq!(result.unwrap_err().field, "work");
    }

    #[test]
    fn empty_context_info_rejected_in_strict_mode() {
        let mut envelope = strict_ready_envelope();
        envelope.context_info = Map::new();
        let result = validate_envelope(&envelope);
        assert_eq!(result.unwrap_err().field, "context_info");
    }

    #[test]
    fn short_reasoning_rejected_in_strict_mode() {
        let mut envelope = strict_ready_envelope();
        envelope.reasoning_md = "short".to_string();
        let result = validate_envelope(&envelope);
        assert_eq!(result.unwrap_err().field, "reasoning_md");
    }

    #[test]
    fn fully_populated_strict_envelope_is_accepted() {
        assert!(validate_envelope(&strict_ready_envelope()).is_ok());
    }

    #[test]
    fn relaxed_mode_accepts_minimal_envelope() {
        let result = validate_envelope(&envelope("test", "", HashMap::new(), false));
        assert!(result.is_ok());
    }
}
