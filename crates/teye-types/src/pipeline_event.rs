use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::eye::EyeResult;

/// One timestamped, sequenced record published to observers of a session
/// (spec §3, §4.6). `seq` is assigned by the bus at publish time and is
/// strictly monotonic per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineEvent {
    pub session_id: String,
    pub seq: u64,
    pub ts_ms: u64,
    #[serde(flatten)]
    pub kind: PipelineEventKind,
    /// Set by the bus when this delivery follows a gap caused by the
    /// slow-consumer drop policy (spec §4.6).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dropped: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEventKind {
    EyeUpdate {
        eye_name: String,
        result: EyeResult,
    },
    OrchestrationProgress {
        progress: f64,
        current_stage: u32,
        total_stage: u32,
        stage_label: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        aborted: Option<bool>,
    },
    SettingsUpdate {
        settings: Value,
    },
    UserInput {
        input: Value,
    },
    Custom {
        event_type: String,
        properties: Value,
    },
}

impl PipelineEvent {
    pub fn new(session_id: impl Into<String>, ts_ms: u64, kind: PipelineEventKind) -> Self {
        Self {
            session_id: session_id.into(),
            seq: 0,
            ts_ms,
            kind,
            dropped: false,
        }
    }
}
