//! Agent engine boundary.
//!
//! The engine decides what actions to take for a job. The coordinator only
//! hands it a rendered instruction plus `InteractionHooks`, and reads back a
//! stop reason.
//!
//! Supports:
//! - **HTTP**: a remote agent reached over HTTP (`HttpAgentEngine`)

pub mod http;

pub use http::HttpAgentEngine;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;
use crate::interaction::InteractionHooks;

/// One unit of agent work.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentTask {
    pub execution_id: Uuid,
    pub job_id: String,
    pub job_name: String,
    /// Steps rendered into a single numbered instruction.
    pub instruction: String,
}

/// What an engine reports when it stops.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentOutcome {
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

impl AgentOutcome {
    pub fn done() -> Self {
        Self::default()
    }

    pub fn aborted() -> Self {
        Self {
            stop_reason: Some("abort".to_string()),
            summary: None,
        }
    }
}

/// An agent that can carry out a job's instruction.
#[async_trait]
pub trait AgentEngine: Send + Sync {
    /// Engine name, for logs.
    fn name(&self) -> &str;

    /// Run a task to completion. Implementations should watch
    /// `hooks.cancelled()` and stop promptly when it fires.
    async fn run(&self, task: AgentTask, hooks: InteractionHooks)
    -> Result<AgentOutcome, EngineError>;
}
