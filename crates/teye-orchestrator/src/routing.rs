use std::collections::HashSet;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use teye_eyes::EyeRegistry;
use teye_types::{TeyeError, WorkEnvelope};

/// Distinct from `EyeRegistry`'s blanket per-Eye timeout — the routing call
/// sits on the hot path of every request, so it gets a tighter budget before
/// the caller falls back to direct Eye invocation (spec §4.1, §9).
pub const ROUTING_DECISION_TIMEOUT: Duration = Duration::from_secs(5);

/// The Eye name reserved for the routing provider call (spec §4.2).
pub const ROUTING_EYE_NAME: &str = "routing";

/// What the routing provider decided to run, plus its stated reasoning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecision {
    pub eyes_needed: Vec<String>,
    pub reasoning: String,
}

/// Asks the registered `routing` Eye which Eyes should run for this
/// envelope. If no `routing` Eye is registered (no provider configured, or
/// the operator chose not to wire one up), this is not an error — it simply
/// returns an empty decision, and `resolve_eye_sequence` falls back to
/// `default_clarity` the same way it does for any other empty request.
///
/// If `routing` IS registered but the call times out, fails, or the
/// provider's reply can't be parsed as `{eyes_needed, reasoning}`, that is
/// surfaced as `TeyeError::LlmError` so the caller can decide whether to
/// retry or invoke Eyes directly (spec §7's recovery hint for that code).
pub async fn decide_route(
    envelope: &WorkEnvelope,
    eyes: &EyeRegistry,
    cancel: CancellationToken,
) -> Result<RouteDecision, TeyeError> {
    if !eyes.contains(ROUTING_EYE_NAME).await {
        return Ok(RouteDecision {
            eyes_needed: Vec::new(),
            reasoning: "no routing eye registered".to_string(),
        });
    }

    let invocation = eyes.invoke(ROUTING_EYE_NAME, envelope, cancel);
    let result = match tokio::time::timeout(ROUTING_DECISION_TIMEOUT, invocation).await {
        Ok(Ok(result)) => result,
        Ok(Err(err)) => {
            return Err(TeyeError::LlmError {
                detail: err.to_string(),
            })
        }
        Err(_) => {
            return Err(TeyeError::LlmError {
                detail: format!("routing decision timed out after {ROUTING_DECISION_TIMEOUT:?}"),
            })
        }
    };

    let eyes_needed: Vec<String> = result
        .data
        .get("eyes_needed")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .ok_or_else(|| TeyeError::LlmError {
            detail: "routing decision missing eyes_needed array".to_string(),
        })?;
    let reasoning = result
        .data
        .get("reasoning")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    Ok(RouteDecision {
        eyes_needed,
        reasoning,
    })
}

/// Resolves the caller-requested Eye names into the sequence the Overseer
/// will actually run (spec §4.2):
///   - duplicates are dropped, keeping the first occurrence's position
///   - names the registry doesn't recognize are dropped with a warning
///     rather than failing the whole request
///   - an empty or entirely-unknown request falls back to `default_clarity`
///     so a caller always gets at least one validation pass
pub async fn resolve_eye_sequence(requested: &[String], eyes: &EyeRegistry) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut sequence = Vec::new();

    for name in requested {
        if !seen.insert(name.clone()) {
            continue;
        }
        if eyes.contains(name).await {
            sequence.push(name.clone());
        } else {
            warn!(eye = %name, "requested eye is not registered, dropping from sequence");
        }
    }

    if sequence.is_empty() {
        sequence.push("default_clarity".to_string());
    }

    sequence
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dedupes_while_preserving_first_occurrence_order() {
        let eyes = EyeRegistry::new();
        let requested = vec![
            "ambiguity_detector".to_string(),
            "default_clarity".to_string(),
            "ambiguity_detector".to_string(),
        ];
        let resolved = resolve_eye_sequence(&requested, &eyes).await;
        assert_eq!(resolved, vec!["ambiguity_detector", "default_clarity"]);
    }

    #[tokio::test]
    async fn unknown_names_are_dropped_not_rejected() {
        let eyes = EyeRegistry::new();
        let requested = vec!["default_clarity".to_string(), "nonexistent".to_string()];
        let resolved = resolve_eye_sequence(&requested, &eyes).await;
        assert_eq!(resolved, vec!["default_clarity"]);
    }

    #[tokio::test]
    async fn empty_request_falls_back_to_default_clarity() {
        let eyes = EyeRegistry::new();
        let resolved = resolve_eye_sequence(&[], &eyes).await;
        assert_eq!(resolved, vec!["default_clarity"]);
    }

    #[tokio::test]
    async fn all_unknown_falls_back_to_default_clarity() {
        let eyes = EyeRegistry::new();
        let resolved = resolve_eye_sequence(&["nonexistent".to_string()], &eyes).await;
        assert_eq!(resolved, vec!["default_clarity"]);
    }

    use async_trait::async_trait;
    use teye_eyes::{Eye, EyeError};
    use teye_types::{EyeDescriptor, EyeResult};

    fn sample_envelope() -> WorkEnvelope {
        WorkEnvelope {
            intent: "review".to_string(),
            work: Default::default(),
            context_info: Default::default(),
            reasoning_md: "A sufficiently detailed reasoning statement.".to_string(),
            context: Default::default(),
            strict_mode: false,
        }
    }

    struct StubRoutingEye {
        response: Result<serde_json::Value, EyeError>,
    }

    #[async_trait]
    impl Eye for StubRoutingEye {
        fn describe(&self) -> EyeDescriptor {
            EyeDescriptor {
                name: "routing".to_string(),
                version: "1.0.0".to_string(),
                accepts_work_kinds: vec!["*".to_string()],
                returns_clarifications: false,
            }
        }

        async fn invoke(&self, _envelope: &WorkEnvelope, _cancel: CancellationToken) -> Result<EyeResult, EyeError> {
            match &self.response {
                Ok(data) => Ok(EyeResult::success("OK_ROUTED", "routed", data.clone())),
                Err(err) => Err(err.clone()),
            }
        }
    }

    struct StuckRoutingEye;

    #[async_trait]
    impl Eye for StuckRoutingEye {
        fn describe(&self) -> EyeDescriptor {
            EyeDescriptor {
                name: "routing".to_string(),
                version: "1.0.0".to_string(),
                accepts_work_kinds: vec!["*".to_string()],
                returns_clarifications: false,
            }
        }

        async fn invoke(&self, _envelope: &WorkEnvelope, _cancel: CancellationToken) -> Result<EyeResult, EyeError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            unreachable!("the timeout in decide_route should have fired first")
        }
    }

    #[tokio::test]
    async fn decide_route_returns_empty_decision_when_routing_is_not_registered() {
        let eyes = EyeRegistry::new();
        let decision = decide_route(&sample_envelope(), &eyes, CancellationToken::new())
            .await
            .unwrap();
        assert!(decision.eyes_needed.is_empty());
    }

    #[tokio::test]
    async fn decide_route_parses_a_well_formed_decision() {
        let eyes = EyeRegistry::new();
        eyes.register(
            "routing",
            std::sync::Arc::new(StubRoutingEye {
                response: Ok(serde_json::json!({
                    "eyes_needed": ["default_clarity", "ambiguity_detector"],
                    "reasoning": "both needed"
                })),
            }),
        )
        .await;
        let decision = decide_route(&sample_envelope(), &eyes, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(decision.eyes_needed, vec!["default_clarity", "ambiguity_detector"]);
        assert_eq!(decision.reasoning, "both needed");
    }

    #[tokio::test]
    async fn decide_route_maps_eye_failure_to_llm_error() {
        let eyes = EyeRegistry::new();
        eyes.register(
            "routing",
            std::sync::Arc::new(StubRoutingEye {
                response: Err(EyeError::Failed("routing".to_string(), "malformed".to_string())),
            }),
        )
        .await;
        let err = decide_route(&sample_envelope(), &eyes, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TeyeError::LlmError { .. }));
    }

    #[tokio::test]
    async fn decide_route_times_out_well_before_the_registrys_blanket_timeout() {
        let eyes = EyeRegistry::new();
        eyes.register("routing", std::sync::Arc::new(StuckRoutingEye)).await;
        let started = tokio::time::Instant::now();
        let err = decide_route(&sample_envelope(), &eyes, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TeyeError::LlmError { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
