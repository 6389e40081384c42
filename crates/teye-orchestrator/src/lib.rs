mod routing;
mod validation;

pub use routing::{decide_route, resolve_eye_sequence, RouteDecision, ROUTING_DECISION_TIMEOUT, ROUTING_EYE_NAME};
pub use validation::{validate_envelope, ValidationError};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use teye_core::PipelineBus;
use teye_eyes::{EyeError, EyeRegistry};
use teye_types::{
    is_clarification_required, is_revision_required, EyeResult, PipelineEventKind, TeyeError, WorkEnvelope,
};

/// What the Overseer produces for a single orchestration run (spec §4.1).
#[derive(Debug, Clone)]
pub struct OrchestrationOutcome {
    pub results: Vec<(String, EyeResult)>,
    pub aborted: bool,
    pub mean_confidence: Option<f64>,
}

/// Drives a work envelope through its resolved Eye sequence, publishing a
/// progress event per stage on the pipeline bus and stopping early when an
/// Eye asks for clarification or a revision, or when a transport failure
/// survives its one retry.
pub struct Overseer {
    eyes: EyeRegistry,
    bus: PipelineBus,
}

impl Overseer {
    pub fn new(eyes: EyeRegistry, bus: PipelineBus) -> Self {
        Self { eyes, bus }
    }

    /// Top-level entrypoint for requests that don't name their own Eye
    /// sequence: asks the `routing` Eye which Eyes apply, resolves that list
    /// against the registry, then runs the ordinary orchestration loop. If
    /// routing fails (no provider reachable, malformed reply, timeout) this
    /// returns `TeyeError::LlmError` instead of silently falling back, so the
    /// caller can choose to retry or invoke Eyes directly per that error's
    /// recovery hint — callers who already know which Eyes they want should
    /// call `orchestrate` directly and skip routing entirely.
    pub async fn decide_and_orchestrate(
        &self,
        envelope: &WorkEnvelope,
        session_id: &str,
        now_ms: u64,
        cancel: CancellationToken,
    ) -> Result<OrchestrationOutcome, TeyeError> {
        let decision = decide_route(envelope, &self.eyes, cancel.clone()).await?;
        self.orchestrate(envelope, &decision.eyes_needed, session_id, now_ms, cancel)
            .await
            .map_err(|err| TeyeError::Internal {
                detail: err.to_string(),
            })
    }

    pub async fn orchestrate(
        &self,
        envelope: &WorkEnvelope,
        requested_eyes: &[String],
        session_id: &str,
        now_ms: u64,
        cancel: CancellationToken,
    ) -> Result<OrchestrationOutcome, EyeError> {
        let sequence = resolve_eye_sequence(requested_eyes, &self.eyes).await;
        let total_stage = sequence.len() as u32;
        let mut results = Vec::with_capacity(sequence.len());
        let mut aborted = false;

        for (index, eye_name) in sequence.iter().enumerate() {
            if cancel.is_cancelled() {
                aborted = true;
                break;
            }

            self.bus
                .publish(
                    session_id,
                    now_ms,
                    PipelineEventKind::OrchestrationProgress {
                        progress: index as f64 / total_stage.max(1) as f64,
                        current_stage: index as u32 + 1,
                        total_stage,
                        stage_label: eye_name.clone(),
                        aborted: None,
                    },
                )
                .await;

            let result = self.invoke_with_retry(eye_name, envelope, cancel.clone()).await;

            let result = match result {
                Ok(result) => result,
                Err(err) => {
                    warn!(eye = %eye_name, error = %err, "eye invocation failed after retry");
                    aborted = true;
                    self.bus
                        .publish(
                            session_id,
                            now_ms,
                            PipelineEventKind::OrchestrationProgress {
                                progress: (index + 1) as f64 / total_stage.max(1) as f64,
                                current_stage: index as u32 + 1,
                                total_stage,
                                stage_label: eye_name.clone(),
                                aborted: Some(true),
                            },
                        )
                        .await;
                    break;
                }
            };

            self.bus
                .publish(
                    session_id,
                    now_ms,
                    PipelineEventKind::EyeUpdate {
                        eye_name: eye_name.clone(),
                        result: result.clone(),
                    },
                )
                .await;

            let should_stop = is_clarification_required(&result.code) || is_revision_required(&result.code);
            results.push((eye_name.clone(), result));
            if should_stop {
                aborted = true;
                break;
            }
        }

        let mean_confidence = mean_confidence(&results);
        info!(
            session_id,
            eyes_run = results.len(),
            aborted,
            "orchestration run complete"
        );

        Ok(OrchestrationOutcome {
            results,
            aborted,
            mean_confidence,
        })
    }

    /// Transport/timeout failures get exactly one retry before the run gives
    /// up on that Eye entirely (spec §4.3) — logic errors and cancellation
    /// are not retried, since repeating them changes nothing.
    async fn invoke_with_retry(
        &self,
        eye_name: &str,
        envelope: &WorkEnvelope,
        cancel: CancellationToken,
    ) -> Result<EyeResult, EyeError> {
        match self.eyes.invoke(eye_name, envelope, cancel.clone()).await {
            Ok(result) => Ok(result),
            Err(err) if err.is_retryable() => self.eyes.invoke(eye_name, envelope, cancel).await,
            Err(err) => Err(err),
        }
    }
}

fn mean_confidence(results: &[(String, EyeResult)]) -> Option<f64> {
    let confidences: Vec<f64> = results.iter().filter_map(|(_, r)| r.confidence()).collect();
    if confidences.is_empty() {
        return None;
    }
    Some(confidences.iter().sum::<f64>() / confidences.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_confidence_ignores_eyes_that_report_none() {
        let results = vec![
            (
                "a".to_string(),
                EyeResult::success("OK", "x", serde_json::json!({"confidence": 1.0})),
            ),
            ("b".to_string(), EyeResult::success("OK", "x", serde_json::json!({}))),
            (
                "c".to_string(),
                EyeResult::success("OK", "x", serde_json::json!({"confidence": 0.5})),
            ),
        ];
        assert_eq!(mean_confidence(&results), Some(0.75));
    }

    #[test]
    fn mean_confidence_is_none_when_nothing_reports_it() {
        let results = vec![(
            "a".to_string(),
            EyeResult::success("OK", "x", serde_json::json!({})),
        )];
        assert_eq!(mean_confidence(&results), None);
    }

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

    #[tokio::test]
    async fn decide_and_orchestrate_falls_back_to_default_clarity_without_a_routing_eye() {
        let overseer = Overseer::new(EyeRegistry::new(), PipelineBus::new());
        let outcome = overseer
            .decide_and_orchestrate(&sample_envelope(), "session-1", 0, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].0, "default_clarity");
    }
}
