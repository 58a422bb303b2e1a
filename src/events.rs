//! Event bus: execution lifecycle and interaction events, broadcast to
//! every subscriber (reply-channel clients, loggers, tests).

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::interaction::model::InteractionRequest;
use crate::worker::state::ExecutionStatus;

/// Events published by the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CoordinatorEvent {
    /// An execution was handed a worker slot.
    #[serde(rename_all = "camelCase")]
    ExecutionStart {
        job_id: String,
        execution_id: Uuid,
        job_name: String,
    },
    /// An execution reached a terminal status.
    #[serde(rename_all = "camelCase")]
    ExecutionComplete {
        job_id: String,
        execution_id: Uuid,
        status: ExecutionStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// A dispatch found the pool full.
    #[serde(rename_all = "camelCase")]
    ExecutionQueued { job_id: String, position: usize },
    /// An agent is waiting on human input.
    InteractionRequest(InteractionRequest),
    /// A pending interaction was answered successfully.
    #[serde(rename_all = "camelCase")]
    InteractionResult {
        request_id: Uuid,
        task_id: Uuid,
        result: serde_json::Value,
    },
    /// A pending interaction was rejected (error reply, abort or teardown).
    #[serde(rename_all = "camelCase")]
    InteractionCancelled {
        request_id: Uuid,
        task_id: Uuid,
        reason: String,
    },
}

impl CoordinatorEvent {
    /// Get the event type name (matches the serde tag).
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ExecutionStart { .. } => "execution-start",
            Self::ExecutionComplete { .. } => "execution-complete",
            Self::ExecutionQueued { .. } => "execution-queued",
            Self::InteractionRequest(_) => "interaction-request",
            Self::InteractionResult { .. } => "interaction-result",
            Self::InteractionCancelled { .. } => "interaction-cancelled",
        }
    }
}

/// Cloneable handle to the broadcast channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CoordinatorEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Having no subscribers is fine.
    pub fn emit(&self, event: CoordinatorEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_event_wire_format() {
        let event = CoordinatorEvent::ExecutionComplete {
            job_id: "job".into(),
            execution_id: Uuid::nil(),
            status: ExecutionStatus::Done,
            error: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "execution-complete");
        assert_eq!(json["jobId"], "job");
        assert_eq!(json["status"], "done");
        assert_eq!(event.event_type(), "execution-complete");
    }

    #[tokio::test]
    async fn emit_reaches_subscribers() {
        let bus = EventBus::new(8);
        bus.emit(CoordinatorEvent::ExecutionQueued {
            job_id: "dropped".into(),
            position: 1,
        });

        let mut rx = bus.subscribe();
        bus.emit(CoordinatorEvent::ExecutionQueued {
            job_id: "seen".into(),
            position: 2,
        });

        match rx.recv().await.unwrap() {
            CoordinatorEvent::ExecutionQueued { job_id, position } => {
                assert_eq!(job_id, "seen");
                assert_eq!(position, 2);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
