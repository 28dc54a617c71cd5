//! Progress events streamed to run subscribers.
//!
//! Events are immutable once published. The bus assigns `seq` and `ts` at
//! publish time, so `seq` is gap-free per run and `ts` never goes backwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Deal, StageSummary};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub run_id: String,
    pub seq: u64,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Status {
        message: String,
    },
    Navigation {
        url: String,
    },
    ThinkingNote {
        note: String,
    },
    SourceFound {
        title: String,
        url: String,
        score: u32,
        rank: usize,
    },
    PropertyProgress {
        index: usize,
        total: usize,
        url: String,
        stage: PropertyStage,
        #[serde(skip_serializing_if = "Option::is_none")]
        deal: Option<Box<Deal>>,
    },
    AnswerFragment {
        text: String,
    },
    Completion {
        ok: bool,
        deals_found: usize,
        message: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        stages: Vec<StageSummary>,
    },
    Heartbeat,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Status { .. } => "status",
            EventKind::Navigation { .. } => "navigation",
            EventKind::ThinkingNote { .. } => "thinking_note",
            EventKind::SourceFound { .. } => "source_found",
            EventKind::PropertyProgress { .. } => "property_progress",
            EventKind::AnswerFragment { .. } => "answer_fragment",
            EventKind::Completion { .. } => "completion",
            EventKind::Heartbeat => "heartbeat",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EventKind::Completion { .. })
    }

    pub fn status(message: impl Into<String>) -> Self {
        EventKind::Status {
            message: message.into(),
        }
    }

    pub fn note(note: impl Into<String>) -> Self {
        EventKind::ThinkingNote { note: note.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyStage {
    Loading,
    Blocked,
    Empty,
    Failed,
    Complete,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_with_flat_type_tag() {
        let event = ProgressEvent {
            run_id: "run-1".into(),
            seq: 3,
            ts: Utc::now(),
            kind: EventKind::status("searching"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(json["message"], "searching");
        assert_eq!(json["seq"], 3);
    }

    #[test]
    fn heartbeat_has_no_payload_fields() {
        let event = ProgressEvent {
            run_id: "run-1".into(),
            seq: 0,
            ts: Utc::now(),
            kind: EventKind::Heartbeat,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "heartbeat");
        assert_eq!(EventKind::Heartbeat.name(), "heartbeat");
    }
}
