//! Interaction broker: per-slot registry of pending human-input requests.
//!
//! Each outstanding request owns a oneshot sender standing in for the
//! resolve/reject pair. A reply resolves it, an error reply rejects it, and
//! cancellation of the owning execution races both and wins with `Aborted`.

use std::collections::HashMap;

use tokio::sync::{Mutex, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::model::{InteractionPayload, InteractionRequest, InteractionResponse, RespondOutcome};
use crate::error::InteractionError;
use crate::events::{CoordinatorEvent, EventBus};

type Reply = Result<serde_json::Value, InteractionError>;

/// The execution an interaction belongs to.
#[derive(Debug, Clone)]
pub struct ExecutionRef {
    pub execution_id: Uuid,
    pub cancel: CancellationToken,
}

/// Which identifier a reply's `requestId` is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKey {
    RequestId,
    ToolId,
}

struct PendingEntry {
    request: InteractionRequest,
    reply_tx: oneshot::Sender<Reply>,
}

#[derive(Default)]
struct BrokerState {
    requests: HashMap<Uuid, PendingEntry>,
    tool_index: HashMap<String, Uuid>,
    last_tool_id: Option<String>,
    closed: bool,
}

impl BrokerState {
    fn remove(&mut self, request_id: Uuid) -> Option<PendingEntry> {
        let entry = self.requests.remove(&request_id)?;
        self.tool_index.retain(|_, id| *id != request_id);
        Some(entry)
    }

    fn resolve_id(&self, raw: &str, key: ReplyKey) -> Option<Uuid> {
        match key {
            ReplyKey::RequestId => Uuid::parse_str(raw)
                .ok()
                .filter(|id| self.requests.contains_key(id)),
            ReplyKey::ToolId => self.tool_index.get(raw).copied(),
        }
    }
}

/// Pending-request broker scoped to one worker slot.
pub struct InteractionBroker {
    job_id: String,
    agent_name: String,
    state: Mutex<BrokerState>,
    events: EventBus,
}

impl InteractionBroker {
    pub fn new(job_id: impl Into<String>, agent_name: impl Into<String>, events: EventBus) -> Self {
        Self {
            job_id: job_id.into(),
            agent_name: agent_name.into(),
            state: Mutex::new(BrokerState::default()),
            events,
        }
    }

    /// Remember the tool the agent is currently running. The next request
    /// raised in this slot is indexed under it.
    pub async fn observe_tool(&self, tool_id: impl Into<String>) {
        self.state.lock().await.last_tool_id = Some(tool_id.into());
    }

    /// Raise a request and wait for its reply.
    ///
    /// Fails with `ContextGone` without registering anything if the slot has
    /// been torn down or the execution is already cancelled.
    pub async fn request(
        &self,
        execution: &ExecutionRef,
        payload: InteractionPayload,
    ) -> Result<serde_json::Value, InteractionError> {
        if execution.cancel.is_cancelled() {
            return Err(InteractionError::ContextGone);
        }

        let request_id = Uuid::new_v4();
        let (reply_tx, reply_rx) = oneshot::channel();

        let request = {
            let mut state = self.state.lock().await;
            if state.closed {
                return Err(InteractionError::ContextGone);
            }

            let tool_id = state.last_tool_id.take();
            if let Some(ref tool_id) = tool_id {
                if let Some(previous) = state.tool_index.insert(tool_id.clone(), request_id) {
                    debug!(tool_id = %tool_id, previous = %previous, "Tool id rebound to new request");
                }
            }

            let request = InteractionRequest {
                request_id,
                task_id: execution.execution_id,
                job_id: self.job_id.clone(),
                agent_name: self.agent_name.clone(),
                interact_type: payload.interact_type,
                prompt: payload.prompt,
                select_options: payload.select_options,
                tool_id,
            };
            state.requests.insert(
                request_id,
                PendingEntry {
                    request: request.clone(),
                    reply_tx,
                },
            );
            request
        };

        info!(
            request_id = %request_id,
            execution_id = %execution.execution_id,
            interact_type = ?request.interact_type,
            "Interaction requested"
        );
        self.events.emit(CoordinatorEvent::InteractionRequest(request));

        tokio::select! {
            reply = reply_rx => reply.unwrap_or(Err(InteractionError::Aborted)),
            _ = execution.cancel.cancelled() => {
                if self.state.lock().await.remove(request_id).is_some() {
                    self.emit_cancelled(request_id, execution.execution_id, &InteractionError::Aborted);
                }
                debug!(request_id = %request_id, "Interaction aborted with its execution");
                Err(InteractionError::Aborted)
            }
        }
    }

    /// Route a reply to its pending request, by request id or tool id.
    /// An exact request id wins over a tool id.
    ///
    /// An unmatched reply (typically one that lost a race with an abort) is
    /// dropped and reported as `NoMatchingRequest`.
    pub async fn respond(&self, response: InteractionResponse) -> RespondOutcome {
        match self.respond_by(response.clone(), ReplyKey::RequestId).await {
            RespondOutcome::Delivered => RespondOutcome::Delivered,
            RespondOutcome::NoMatchingRequest => self.respond_by(response, ReplyKey::ToolId).await,
        }
    }

    /// Route a reply matching only on `key`.
    pub async fn respond_by(&self, response: InteractionResponse, key: ReplyKey) -> RespondOutcome {
        let entry = {
            let mut state = self.state.lock().await;
            match state.resolve_id(&response.request_id, key) {
                Some(id) => state.remove(id),
                None => None,
            }
        };

        let Some(entry) = entry else {
            return RespondOutcome::NoMatchingRequest;
        };

        let request_id = entry.request.request_id;
        let task_id = entry.request.task_id;

        if response.success {
            let result = response.result.unwrap_or(serde_json::Value::Null);
            if entry.reply_tx.send(Ok(result.clone())).is_err() {
                warn!(request_id = %request_id, "Interaction resolved after its waiter went away");
            }
            info!(request_id = %request_id, "Interaction resolved");
            self.events.emit(CoordinatorEvent::InteractionResult {
                request_id,
                task_id,
                result,
            });
        } else {
            let reason = InteractionError::Rejected(
                response
                    .error
                    .unwrap_or_else(|| "rejected by operator".to_string()),
            );
            let _ = entry.reply_tx.send(Err(reason.clone()));
            info!(request_id = %request_id, error = %reason, "Interaction rejected");
            self.emit_cancelled(request_id, task_id, &reason);
        }

        RespondOutcome::Delivered
    }

    /// Reject every outstanding request with `reason` and clear both
    /// indexes. Returns how many were rejected.
    pub async fn reject_all(&self, reason: InteractionError) -> usize {
        let entries: Vec<PendingEntry> = {
            let mut state = self.state.lock().await;
            state.tool_index.clear();
            state.last_tool_id = None;
            state.requests.drain().map(|(_, e)| e).collect()
        };

        let count = entries.len();
        for entry in entries {
            let _ = entry.reply_tx.send(Err(reason.clone()));
            self.emit_cancelled(entry.request.request_id, entry.request.task_id, &reason);
        }

        if count > 0 {
            info!(job_id = %self.job_id, count, reason = %reason, "Rejected pending interactions");
        }
        count
    }

    /// Tear the broker down: reject everything with `ContextGone` and refuse
    /// further requests.
    pub async fn close(&self) -> usize {
        self.state.lock().await.closed = true;
        self.reject_all(InteractionError::ContextGone).await
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    /// Outstanding requests, for re-syncing a reply-channel client.
    pub async fn pending(&self) -> Vec<InteractionRequest> {
        self.state
            .lock()
            .await
            .requests
            .values()
            .map(|e| e.request.clone())
            .collect()
    }

    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.requests.len()
    }

    /// Number of tool ids currently indexed.
    pub async fn indexed_tools(&self) -> usize {
        self.state.lock().await.tool_index.len()
    }

    fn emit_cancelled(&self, request_id: Uuid, task_id: Uuid, reason: &InteractionError) {
        self.events.emit(CoordinatorEvent::InteractionCancelled {
            request_id,
            task_id,
            reason: reason.to_string(),
        });
    }
}
