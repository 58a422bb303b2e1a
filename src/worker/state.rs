//! Execution state types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Terminal status of an execution.
///
/// Taken from the engine's stop reason; anything unrecognised is carried
/// through as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ExecutionStatus {
    Done,
    Error,
    Abort,
    Other(String),
}

impl ExecutionStatus {
    /// Map an engine stop reason, defaulting to `Done` when absent.
    pub fn from_stop_reason(stop_reason: Option<&str>) -> Self {
        match stop_reason {
            None => Self::Done,
            Some(reason) if reason.trim().is_empty() => Self::Done,
            Some(reason) => Self::from(reason.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Done => "done",
            Self::Error => "error",
            Self::Abort => "abort",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for ExecutionStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "done" => Self::Done,
            "error" => Self::Error,
            "abort" | "aborted" => Self::Abort,
            _ => Self::Other(s),
        }
    }
}

impl From<ExecutionStatus> for String {
    fn from(status: ExecutionStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A dispatched execution that has not yet reported a terminal status.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunningExecution {
    pub job_id: String,
    pub execution_id: Uuid,
    pub started_at: DateTime<Utc>,
}

impl RunningExecution {
    /// Record a fresh execution of `job_id` with a newly minted id.
    pub fn start(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            execution_id: Uuid::new_v4(),
            started_at: Utc::now(),
        }
    }
}
