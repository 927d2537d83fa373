//! Job records and the result envelope every task produces

use crate::task::TaskCall;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is queued, waiting for a worker
    Pending,
    /// A worker is executing the job
    Running,
    /// The task ran and produced an envelope
    Completed,
    /// The task raised an error the envelope cannot carry
    Failed,
}

impl JobStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Uniform result of every task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub content: Map<String, Value>,
    pub error: Option<String>,
    pub params: Map<String, Value>,
}

impl TaskEnvelope {
    /// Envelope for a task that succeeded with `content`
    pub fn success(content: Map<String, Value>) -> Self {
        Self {
            content,
            error: None,
            params: Map::new(),
        }
    }

    /// Envelope for a task that succeeded without producing content
    pub fn empty() -> Self {
        Self::success(Map::new())
    }

    /// Envelope for a task rejected by validation
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            content: Map::new(),
            error: Some(message.into()),
            params: Map::new(),
        }
    }
}

/// A job in the queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier
    pub id: String,

    /// Task name and positional arguments
    pub task: TaskCall,

    /// Current status
    pub status: JobStatus,

    /// When the job was submitted
    pub created_at: DateTime<Utc>,

    /// When a worker picked the job up
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When the job finished
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Task result (once completed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskEnvelope>,

    /// Error message (if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl Job {
    /// Create a new pending job
    pub fn new(id: String, task: TaskCall) -> Self {
        Self {
            id,
            task,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            failure: None,
        }
    }

    /// Mark job as running
    pub fn mark_running(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Mark job as completed with its envelope
    pub fn mark_completed(&mut self, envelope: TaskEnvelope) {
        self.status = JobStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.result = Some(envelope);
    }

    /// Mark job as failed
    pub fn mark_failed(&mut self, error: String) {
        self.status = JobStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.failure = Some(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn show_call() -> TaskCall {
        TaskCall {
            name: "claritynow.show".to_string(),
            args: vec!["alice".to_string()],
        }
    }

    #[test]
    fn test_envelope_shape() {
        let envelope = TaskEnvelope::failure("No such network named alice_lab");
        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(
            value,
            json!({"content": {}, "error": "No such network named alice_lab", "params": {}})
        );
    }

    #[test]
    fn test_success_envelope_has_null_error() {
        let mut content = Map::new();
        content.insert("image".to_string(), json!(["2.11.0"]));

        let value = serde_json::to_value(TaskEnvelope::success(content)).unwrap();
        assert!(value["error"].is_null());
        assert_eq!(value["content"]["image"][0], "2.11.0");
    }

    #[test]
    fn test_job_lifecycle() {
        let mut job = Job::new("job-1".to_string(), show_call());
        assert_eq!(job.status, JobStatus::Pending);
        assert!(!job.status.is_finished());

        job.mark_running();
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.started_at.is_some());

        job.mark_completed(TaskEnvelope::empty());
        assert!(job.status.is_finished());
        assert!(job.completed_at.is_some());
        assert_eq!(job.result, Some(TaskEnvelope::empty()));
        assert!(job.failure.is_none());
    }

    #[test]
    fn test_failed_job_serializes_without_result() {
        let mut job = Job::new("job-2".to_string(), show_call());
        job.mark_failed("Failed to disable NTP on the server".to_string());

        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["status"], "failed");
        assert!(value.get("result").is_none());
        assert_eq!(value["failure"], "Failed to disable NTP on the server");
    }
}
