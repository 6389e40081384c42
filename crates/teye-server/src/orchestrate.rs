use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::{Extension, Json};
use serde_json::{json, Map, Value};

use teye_core::AuditEvent;
use teye_orchestrator::{validate_envelope, OrchestrationOutcome};
use teye_types::{
    is_clarification_required, is_revision_required, now_ms, ApiKey, ClarificationSubmission, EyeResult,
    TeyeError, WorkEnvelope,
};
use uuid::Uuid;

use crate::error_response::ApiError;
use crate::state::AppState;

/// `POST /validate` and `POST /eyes/overseer/orchestrate` both land here —
/// the former is the plain HTTP surface, the latter the name an MCP bridge
/// maps its tool call to (spec §6); both submit the same `WorkEnvelope`.
pub async fn orchestrate_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<ApiKey>,
    headers: HeaderMap,
    Json(envelope): Json<WorkEnvelope>,
) -> Result<Json<Value>, ApiError> {
    let connection_id = connection_id_from(&headers, &auth);
    let body = run_orchestration(&state, envelope, &connection_id, &auth).await?;
    Ok(Json(body))
}

/// `POST /session/{id}/clarifications` — merges the caller's answers into
/// the envelope an Eye paused on and resumes orchestration from scratch
/// (spec §4.3's clarification loop).
pub async fn submit_clarifications_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<ApiKey>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    Json(submission): Json<ClarificationSubmission>,
) -> Result<Json<Value>, ApiError> {
    let pending = state
        .pending_clarifications
        .take(&session_id)
        .await
        .ok_or_else(|| TeyeError::BadPayloadSchema {
            field: "session_id".to_string(),
            hint: "no pending clarification for this session".to_string(),
        })?;
    let envelope = pending.with_clarification_answers(submission.answers);
    let connection_id = connection_id_from(&headers, &auth);
    let body = run_orchestration(&state, envelope, &connection_id, &auth).await?;
    Ok(Json(body))
}

async fn run_orchestration(
    state: &AppState,
    mut envelope: WorkEnvelope,
    connection_id: &str,
    auth: &ApiKey,
) -> Result<Value, ApiError> {
    let now = now_ms();

    if envelope.context.session_id.is_none() {
        let session = state.sessions.get_or_create(connection_id, now).await;
        envelope.context.session_id = Some(session.id);
    }
    let session_id = envelope.context.session_id.clone().expect("set above");

    if envelope.context.tenant_id.is_none() {
        envelope.context.tenant_id = auth.tenant_id.clone();
    }

    validate_envelope(&envelope).map_err(|err| TeyeError::BadPayloadSchema {
        field: err.field,
        hint: err.hint,
    })?;

    state.sessions.touch(&session_id, now).await;

    let cancel = state.cancellations.token_for(&session_id).await;
    let outcome = state
        .overseer
        .decide_and_orchestrate(&envelope, &session_id, now, cancel)
        .await?;

    let _ = state
        .storage
        .append_audit_event(AuditEvent {
            id: Uuid::new_v4().to_string(),
            ts_ms: now,
            actor: auth.id.clone(),
            action: "orchestrate".to_string(),
            detail: json!({"session_id": session_id, "intent": envelope.intent}),
        })
        .await;

    if outcome
        .results
        .last()
        .map(|(_, r)| is_clarification_required(&r.code) || is_revision_required(&r.code))
        .unwrap_or(false)
    {
        state.pending_clarifications.insert(session_id.clone(), envelope).await;
    }

    response_from_outcome(&outcome).map_err(ApiError::from)
}

fn response_from_outcome(outcome: &OrchestrationOutcome) -> Result<Value, TeyeError> {
    if let Some((_, last)) = outcome.results.last() {
        if is_clarification_required(&last.code) {
            let clarifications = last.data.get("questions").cloned().unwrap_or_else(|| json!([]));
            return Ok(json!({
                "ok": false,
                "code": last.code,
                "md": last.md,
                "data": {"results": results_map(outcome), "clarifications": clarifications},
                "nextAction": "submit_clarifications",
            }));
        }
        if is_revision_required(&last.code) {
            let recommendations = last.data.get("recommendations").cloned().unwrap_or_else(|| json!([]));
            return Ok(json!({
                "ok": false,
                "code": last.code,
                "md": last.md,
                "data": {"results": results_map(outcome), "recommendations": recommendations},
                "nextAction": "submit_revision",
            }));
        }
    }

    if outcome.aborted {
        return Err(TeyeError::OrchestrationFailed {
            partial_results: results_map(outcome),
            completed_validations: outcome.results.iter().map(|(name, _)| name.clone()).collect(),
        });
    }

    let ok = outcome.results.iter().all(|(_, r)| r.ok == Some(true));
    Ok(json!({
        "ok": ok,
        "code": if ok { "OK_ALL" } else { "E_PARTIAL_FAIL" },
        "md": summary_md(&outcome.results, ok),
        "data": {"results": results_map(outcome), "confidence": outcome.mean_confidence},
        "nextAction": Value::Null,
    }))
}

fn results_map(outcome: &OrchestrationOutcome) -> Value {
    let map: Map<String, Value> = outcome
        .results
        .iter()
        .map(|(name, result): &(String, EyeResult)| {
            (name.clone(), serde_json::to_value(result).unwrap_or(Value::Null))
        })
        .collect();
    Value::Object(map)
}

fn summary_md(results: &[(String, EyeResult)], ok: bool) -> String {
    let passed = results.iter().filter(|(_, r)| r.ok == Some(true)).count();
    if ok {
        format!("All {} eye(s) passed.", results.len())
    } else {
        format!("{passed}/{} eye(s) passed.", results.len())
    }
}

fn connection_id_from(headers: &HeaderMap, auth: &ApiKey) -> String {
    headers
        .get("x-connection-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| auth.id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use teye_types::EyeResult;

    #[test]
    fn response_from_outcome_reports_ok_all_when_every_eye_passes() {
        let outcome = OrchestrationOutcome {
            results: vec![("default_clarity".to_string(), EyeResult::success("OK_CLARITY", "fine", json!({})))],
            aborted: false,
            mean_confidence: Some(1.0),
        };
        let body = response_from_outcome(&outcome).unwrap();
        assert_eq!(body["ok"], json!(true));
        assert_eq!(body["code"], json!("OK_ALL"));
    }

    #[test]
    fn response_from_outcome_surfaces_clarify_as_next_action() {
        let outcome = OrchestrationOutcome {
            results: vec![(
                "ambiguity_detector".to_string(),
                EyeResult::failure(
                    teye_types::CODE_CLARIFY,
                    "too thin",
                    json!({"questions": [{"question": "which component?"}]}),
                ),
            )],
            aborted: true,
            mean_confidence: None,
        };
        let body = response_from_outcome(&outcome).unwrap();
        assert_eq!(body["nextAction"], json!("submit_clarifications"));
        assert_eq!(body["data"]["clarifications"][0]["question"], json!("which component?"));
    }

    #[test]
    fn response_from_outcome_maps_mid_pipeline_abort_to_orchestration_failed() {
        let outcome = OrchestrationOutcome {
            results: vec![("default_clarity".to_string(), EyeResult::success("OK_CLARITY", "fine", json!({})))],
            aborted: true,
            mean_confidence: None,
        };
        let err = response_from_outcome(&outcome).unwrap_err();
        assert!(matches!(err, TeyeError::OrchestrationFailed { .. }));
    }
}
