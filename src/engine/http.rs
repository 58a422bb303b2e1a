//! Remote agent engine over HTTP.
//!
//! POSTs the task to a configured endpoint and waits for `{stopReason}`.
//! The remote agent raises interactions by calling back into
//! `POST /api/executions/{executionId}/interactions` on the control surface.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use super::{AgentEngine, AgentOutcome, AgentTask};
use crate::error::EngineError;
use crate::interaction::InteractionHooks;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RunRequest<'a> {
    #[serde(flatten)]
    task: &'a AgentTask,
    interact_url: String,
}

/// Agent engine backed by a remote HTTP service.
pub struct HttpAgentEngine {
    client: reqwest::Client,
    endpoint: String,
    callback_base: String,
}

impl HttpAgentEngine {
    /// `callback_base` is the externally reachable base URL of this
    /// process's control surface, e.g. `http://127.0.0.1:8080`.
    pub fn new(endpoint: impl Into<String>, callback_base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            callback_base: callback_base.into().trim_end_matches('/').to_string(),
        }
    }

    fn interact_url(&self, task: &AgentTask) -> String {
        format!(
            "{}/api/executions/{}/interactions",
            self.callback_base, task.execution_id
        )
    }
}

#[async_trait]
impl AgentEngine for HttpAgentEngine {
    fn name(&self) -> &str {
        "http"
    }

    async fn run(
        &self,
        task: AgentTask,
        hooks: InteractionHooks,
    ) -> Result<AgentOutcome, EngineError> {
        let body = RunRequest {
            task: &task,
            interact_url: self.interact_url(&task),
        };

        info!(
            execution_id = %task.execution_id,
            endpoint = %self.endpoint,
            "Dispatching task to remote agent"
        );

        let send = self.client.post(&self.endpoint).json(&body).send();
        let response = tokio::select! {
            r = send => r?,
            _ = hooks.cancelled() => {
                debug!(execution_id = %task.execution_id, "Remote agent call cancelled");
                return Ok(AgentOutcome::aborted());
            }
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(EngineError::RequestFailed(format!("HTTP {status}: {text}")));
        }

        tokio::select! {
            r = response.json::<AgentOutcome>() => {
                r.map_err(|e| EngineError::InvalidResponse(e.to_string()))
            }
            _ = hooks.cancelled() => Ok(AgentOutcome::aborted()),
        }
    }
}
