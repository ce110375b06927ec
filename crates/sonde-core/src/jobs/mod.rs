//! In-process job tracking: job records, the handler contract, and the
//! bounded-concurrency [`Orchestrator`].
//!
//! Jobs are process-lifetime only. Their lifecycle is
//! `pending -> processing -> completed | failed`, with `pending -> failed`
//! reachable through cancellation alone.

pub mod handler;
pub mod orchestrator;

pub use handler::{handler_fn, FnHandler, JobContext, JobHandler};
pub use orchestrator::Orchestrator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// What a caller submits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub job_type: String,
    pub repository_id: String,
    #[serde(default)]
    pub payload: Value,
}

impl JobSpec {
    pub fn new(job_type: impl Into<String>, repository_id: impl Into<String>, payload: Value) -> Self {
        Self {
            job_type: job_type.into(),
            repository_id: repository_id.into(),
            payload,
        }
    }
}

/// Point-in-time copy of a job, the shape external pollers rely on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub id: String,
    #[serde(rename = "type")]
    pub job_type: String,
    pub repository_id: String,
    pub status: JobStatus,
    pub progress: u8,
    /// Opaque payload: the submitted job data, merged with handler extras.
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Lifecycle notifications published by the orchestrator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    Enqueued { job_id: String, repository_id: String },
    Started { job_id: String },
    Progress { job_id: String, progress: u8 },
    Completed { job_id: String },
    Failed { job_id: String, error: String },
}

impl JobEvent {
    pub fn job_id(&self) -> &str {
        match self {
            JobEvent::Enqueued { job_id, .. }
            | JobEvent::Started { job_id }
            | JobEvent::Progress { job_id, .. }
            | JobEvent::Completed { job_id }
            | JobEvent::Failed { job_id, .. } => job_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Completed { .. } | JobEvent::Failed { .. })
    }
}

/// Merge handler-supplied extras into a job's payload: objects merge key by
/// key, anything else replaces the payload.
pub fn merge_payload(target: &mut Value, extra: Value) {
    match (target, extra) {
        (Value::Object(existing), Value::Object(incoming)) => {
            for (key, value) in incoming {
                existing.insert(key, value);
            }
        }
        (slot, incoming) => *slot = incoming,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_payload_objects() {
        let mut data = json!({"source": "git", "files": 1});
        merge_payload(&mut data, json!({"files": 2, "stage": "parse"}));
        assert_eq!(data, json!({"source": "git", "files": 2, "stage": "parse"}));
    }

    #[test]
    fn test_merge_payload_replaces_non_objects() {
        let mut data = Value::Null;
        merge_payload(&mut data, json!({"a": 1}));
        assert_eq!(data, json!({"a": 1}));
        merge_payload(&mut data, json!(7));
        assert_eq!(data, json!(7));
    }

    #[test]
    fn test_snapshot_serializes_with_stable_names() {
        let snapshot = JobSnapshot {
            id: "j".to_string(),
            job_type: "analyze_repository".to_string(),
            repository_id: "r".to_string(),
            status: JobStatus::Processing,
            progress: 40,
            data: Value::Null,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["type"], "analyze_repository");
        assert_eq!(value["repositoryId"], "r");
        assert_eq!(value["status"], "processing");
        assert!(value.get("error").is_none());
        assert!(value.get("createdAt").is_some());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }
}
