//! Interaction request/response types (human-in-the-loop checkpoints).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of human input an agent is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractType {
    Confirm,
    Input,
    Select,
    RequestHelp,
}

/// What the agent supplies when raising an interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionPayload {
    pub interact_type: InteractType,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select_options: Option<Vec<String>>,
}

impl InteractionPayload {
    pub fn confirm(prompt: impl Into<String>) -> Self {
        Self {
            interact_type: InteractType::Confirm,
            prompt: prompt.into(),
            select_options: None,
        }
    }

    pub fn input(prompt: impl Into<String>) -> Self {
        Self {
            interact_type: InteractType::Input,
            prompt: prompt.into(),
            select_options: None,
        }
    }

    pub fn select(prompt: impl Into<String>, options: Vec<String>) -> Self {
        Self {
            interact_type: InteractType::Select,
            prompt: prompt.into(),
            select_options: Some(options),
        }
    }

    pub fn request_help(prompt: impl Into<String>) -> Self {
        Self {
            interact_type: InteractType::RequestHelp,
            prompt: prompt.into(),
            select_options: None,
        }
    }
}

/// Outbound request emitted to the reply channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionRequest {
    pub request_id: Uuid,
    /// Execution that raised the request.
    pub task_id: Uuid,
    pub job_id: String,
    pub agent_name: String,
    pub interact_type: InteractType,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select_options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_id: Option<String>,
}

/// Reply delivered by the reply channel.
///
/// `request_id` is matched against request ids first and tool ids second,
/// so it is kept as a plain string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionResponse {
    pub request_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InteractionResponse {
    pub fn ok(request_id: impl ToString, result: serde_json::Value) -> Self {
        Self {
            request_id: request_id.to_string(),
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(request_id: impl ToString, error: impl Into<String>) -> Self {
        Self {
            request_id: request_id.to_string(),
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Outcome of routing a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RespondOutcome {
    /// A pending request was resolved or rejected.
    Delivered,
    /// Nothing matched; the reply was dropped.
    NoMatchingRequest,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_wire_format() {
        let req = InteractionRequest {
            request_id: Uuid::nil(),
            task_id: Uuid::nil(),
            job_id: "job".into(),
            agent_name: "agent".into(),
            interact_type: InteractType::RequestHelp,
            prompt: "stuck on captcha".into(),
            select_options: None,
            tool_id: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["interactType"], "request_help");
        assert_eq!(json["agentName"], "agent");
        assert!(json.get("selectOptions").is_none());
    }

    #[test]
    fn response_parses_without_optional_fields() {
        let resp: InteractionResponse =
            serde_json::from_str(r#"{"requestId": "abc", "success": false}"#).unwrap();
        assert_eq!(resp.request_id, "abc");
        assert!(resp.result.is_none());
        assert!(resp.error.is_none());
    }
}
