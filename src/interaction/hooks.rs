//! Interaction hooks handed to an agent engine for one execution.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::broker::{ExecutionRef, InteractionBroker};
use super::model::InteractionPayload;
use crate::error::InteractionError;

/// Lets a running agent pause for human input and observe cancellation.
#[derive(Clone)]
pub struct InteractionHooks {
    broker: Arc<InteractionBroker>,
    execution: ExecutionRef,
}

impl InteractionHooks {
    pub fn new(broker: Arc<InteractionBroker>, execution: ExecutionRef) -> Self {
        Self { broker, execution }
    }

    pub fn execution_id(&self) -> Uuid {
        self.execution.execution_id
    }

    /// Cancellation token of the owning execution.
    pub fn cancellation(&self) -> CancellationToken {
        self.execution.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.execution.cancel.is_cancelled()
    }

    /// Resolves once the execution is aborted.
    pub async fn cancelled(&self) {
        self.execution.cancel.cancelled().await
    }

    /// Note the tool currently running so replies can address it.
    pub async fn observe_tool(&self, tool_id: impl Into<String>) {
        self.broker.observe_tool(tool_id).await
    }

    /// Raise an arbitrary interaction and wait for the raw reply value.
    pub async fn request(
        &self,
        payload: InteractionPayload,
    ) -> Result<serde_json::Value, InteractionError> {
        self.broker.request(&self.execution, payload).await
    }

    /// Ask a yes/no question.
    pub async fn confirm(&self, prompt: impl Into<String>) -> Result<bool, InteractionError> {
        let value = self.request(InteractionPayload::confirm(prompt)).await?;
        Ok(match value {
            serde_json::Value::Bool(b) => b,
            serde_json::Value::String(s) => matches!(s.as_str(), "true" | "yes" | "confirm"),
            _ => false,
        })
    }

    /// Ask for free-form text.
    pub async fn input(&self, prompt: impl Into<String>) -> Result<String, InteractionError> {
        let value = self.request(InteractionPayload::input(prompt)).await?;
        Ok(value_to_text(value))
    }

    /// Ask the operator to pick one of `options`.
    pub async fn select(
        &self,
        prompt: impl Into<String>,
        options: Vec<String>,
    ) -> Result<String, InteractionError> {
        let value = self
            .request(InteractionPayload::select(prompt, options))
            .await?;
        Ok(value_to_text(value))
    }

    /// Hand control to the operator until they reply.
    pub async fn request_help(
        &self,
        prompt: impl Into<String>,
    ) -> Result<serde_json::Value, InteractionError> {
        self.request(InteractionPayload::request_help(prompt)).await
    }
}

fn value_to_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}
