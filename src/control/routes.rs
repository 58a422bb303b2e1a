//! REST endpoints for task management and interaction replies.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::coordinator::Coordinator;
use crate::error::{InteractionError, SchedulerError};
use crate::interaction::{InteractionPayload, InteractionResponse, RespondOutcome};
use crate::scheduler::{DispatchOutcome, JobPayload};

/// Uniform `{success, ...}` body returned by every task operation.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_execute_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queued: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl TaskResult {
    fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            ..Default::default()
        }
    }

    fn dispatched(outcome: DispatchOutcome) -> Self {
        match outcome {
            DispatchOutcome::Started { execution_id } => Self {
                execution_id: Some(execution_id),
                ..Self::ok()
            },
            DispatchOutcome::Queued { position } => Self {
                queued: Some(true),
                position: Some(position),
                ..Self::ok()
            },
        }
    }
}

fn reply(status: StatusCode, body: TaskResult) -> Response {
    (status, Json(body)).into_response()
}

fn scheduler_failure(err: SchedulerError) -> Response {
    let status = match err {
        SchedulerError::NotFound { .. } => StatusCode::NOT_FOUND,
        SchedulerError::NotRunning => StatusCode::CONFLICT,
        SchedulerError::InvalidSchedule { .. }
        | SchedulerError::InvalidJob { .. }
        | SchedulerError::AlreadyExpired { .. } => StatusCode::BAD_REQUEST,
    };
    warn!(error = %err, "Task operation failed");
    reply(status, TaskResult::failed(err))
}

// ── Health / status ─────────────────────────────────────────────────────

pub(super) async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "agent-scheduler"
    }))
}

pub(super) async fn status(State(coordinator): State<Arc<Coordinator>>) -> impl IntoResponse {
    Json(coordinator.status().await)
}

pub(super) async fn start_scheduler(
    State(coordinator): State<Arc<Coordinator>>,
) -> impl IntoResponse {
    coordinator.start();
    Json(TaskResult::ok())
}

pub(super) async fn stop_scheduler(
    State(coordinator): State<Arc<Coordinator>>,
) -> impl IntoResponse {
    coordinator.stop().await;
    Json(TaskResult::ok())
}

// ── Tasks ───────────────────────────────────────────────────────────────

pub(super) async fn add_task(
    State(coordinator): State<Arc<Coordinator>>,
    Json(payload): Json<JobPayload>,
) -> Response {
    match coordinator.add_task(payload).await {
        Ok(next_execute_at) => reply(
            StatusCode::OK,
            TaskResult {
                next_execute_at,
                ..TaskResult::ok()
            },
        ),
        Err(e) => scheduler_failure(e),
    }
}

pub(super) async fn remove_task(
    State(coordinator): State<Arc<Coordinator>>,
    Path(id): Path<String>,
) -> Response {
    match coordinator.remove_task(&id).await {
        Ok(()) => reply(StatusCode::OK, TaskResult::ok()),
        Err(e) => scheduler_failure(e),
    }
}

pub(super) async fn execute_task(
    State(coordinator): State<Arc<Coordinator>>,
    Json(payload): Json<JobPayload>,
) -> Response {
    match coordinator.execute_now(payload).await {
        Ok(outcome) => reply(StatusCode::OK, TaskResult::dispatched(outcome)),
        Err(e) => scheduler_failure(e),
    }
}

pub(super) async fn abort_task(
    State(coordinator): State<Arc<Coordinator>>,
    Path(id): Path<String>,
) -> Response {
    match coordinator.abort_task(&id).await {
        Ok(execution_id) => {
            info!(job_id = %id, execution_id = %execution_id, "Task aborted via API");
            reply(
                StatusCode::OK,
                TaskResult {
                    execution_id: Some(execution_id),
                    ..TaskResult::ok()
                },
            )
        }
        Err(e) => scheduler_failure(e),
    }
}

// ── Interactions ────────────────────────────────────────────────────────

pub(super) async fn respond(
    State(coordinator): State<Arc<Coordinator>>,
    Json(response): Json<InteractionResponse>,
) -> Response {
    match coordinator.respond(response).await {
        RespondOutcome::Delivered => reply(StatusCode::OK, TaskResult::ok()),
        RespondOutcome::NoMatchingRequest => reply(
            StatusCode::NOT_FOUND,
            TaskResult::failed("No pending interaction matches this reply"),
        ),
    }
}

/// Interaction raised by a remote agent engine.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct InteractBody {
    #[serde(flatten)]
    payload: InteractionPayload,
    #[serde(default)]
    tool_id: Option<String>,
}

pub(super) async fn interact(
    State(coordinator): State<Arc<Coordinator>>,
    Path(id): Path<String>,
    Json(body): Json<InteractBody>,
) -> Response {
    let Ok(execution_id) = Uuid::parse_str(&id) else {
        return reply(
            StatusCode::BAD_REQUEST,
            TaskResult::failed("Invalid execution ID"),
        );
    };

    match coordinator
        .interact(execution_id, body.payload, body.tool_id)
        .await
    {
        Ok(result) => reply(
            StatusCode::OK,
            TaskResult {
                result: Some(result),
                ..TaskResult::ok()
            },
        ),
        Err(e @ InteractionError::ContextGone) => reply(StatusCode::GONE, TaskResult::failed(e)),
        Err(e) => reply(StatusCode::OK, TaskResult::failed(e)),
    }
}
