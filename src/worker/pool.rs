//! Worker pool: bounded set of slots, at most one per job id.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use super::slot::WorkerSlot;
use crate::error::PoolError;
use crate::events::EventBus;
use crate::interaction::{InteractionRequest, InteractionResponse, ReplyKey, RespondOutcome};

/// Owns every occupied worker slot.
pub struct WorkerPool {
    max_concurrent: usize,
    teardown_grace: Duration,
    agent_name: String,
    events: EventBus,
    slots: Mutex<HashMap<String, Arc<WorkerSlot>>>,
}

impl WorkerPool {
    pub fn new(
        max_concurrent: usize,
        teardown_grace: Duration,
        agent_name: impl Into<String>,
        events: EventBus,
    ) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
            teardown_grace,
            agent_name: agent_name.into(),
            events,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Whether a slot is free for a job that doesn't own one yet.
    pub async fn has_capacity(&self) -> bool {
        self.slots.lock().await.len() < self.max_concurrent
    }

    /// Whether `acquire(job_id)` would succeed: the job already owns a slot,
    /// or a slot is free.
    pub async fn can_accept(&self, job_id: &str) -> bool {
        let slots = self.slots.lock().await;
        slots.contains_key(job_id) || slots.len() < self.max_concurrent
    }

    /// Get a slot for `job_id`.
    ///
    /// A job that already owns a slot gets the same slot back, after its
    /// current execution has been aborted and given `teardown_grace` to
    /// wind down.
    pub async fn acquire(&self, job_id: &str) -> Result<Arc<WorkerSlot>, PoolError> {
        let existing = {
            let mut slots = self.slots.lock().await;
            match slots.get(job_id) {
                Some(slot) => slot.clone(),
                None => {
                    if slots.len() >= self.max_concurrent {
                        return Err(PoolError::PoolExhausted {
                            max: self.max_concurrent,
                        });
                    }
                    let slot = Arc::new(WorkerSlot::new(
                        job_id,
                        &self.agent_name,
                        self.events.clone(),
                    ));
                    slots.insert(job_id.to_string(), slot.clone());
                    debug!(
                        job_id = %job_id,
                        slot_id = %slot.slot_id(),
                        occupied = slots.len(),
                        "Slot allocated"
                    );
                    return Ok(slot);
                }
            }
        };

        if let Some(previous) = existing.abort_current(self.teardown_grace).await {
            info!(job_id = %job_id, previous = %previous, "Reusing slot after abort");
        }
        Ok(existing)
    }

    /// Free the slot owned by `job_id`. Pending interactions are rejected
    /// before the slot stops counting as occupied.
    pub async fn release(&self, job_id: &str) -> bool {
        let mut slots = self.slots.lock().await;
        let Some(slot) = slots.get(job_id).cloned() else {
            return false;
        };

        slot.abort_current(self.teardown_grace).await;
        slot.broker().close().await;
        slots.remove(job_id);
        debug!(job_id = %job_id, occupied = slots.len(), "Slot released");
        true
    }

    /// Free the slot owned by `job_id` only if `execution_id` is still its
    /// current execution. Used by the runner on completion, so a finished
    /// execution never evicts a newer one that reused the slot.
    pub async fn release_if_current(&self, job_id: &str, execution_id: Uuid) -> bool {
        let mut slots = self.slots.lock().await;
        let Some(slot) = slots.get(job_id).cloned() else {
            return false;
        };

        if !slot.finish(execution_id).await {
            debug!(
                job_id = %job_id,
                execution_id = %execution_id,
                "Slot was reused; leaving it in place"
            );
            return false;
        }

        slot.broker().close().await;
        slots.remove(job_id);
        debug!(job_id = %job_id, occupied = slots.len(), "Slot released");
        true
    }

    /// Abort and release every slot.
    pub async fn release_all(&self) -> usize {
        let job_ids: Vec<String> = self.slots.lock().await.keys().cloned().collect();
        let mut released = 0;
        for job_id in job_ids {
            if self.release(&job_id).await {
                released += 1;
            }
        }
        released
    }

    pub async fn occupied(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn slot(&self, job_id: &str) -> Option<Arc<WorkerSlot>> {
        self.slots.lock().await.get(job_id).cloned()
    }

    /// The slot currently running `execution_id`.
    pub async fn find_execution(&self, execution_id: Uuid) -> Option<Arc<WorkerSlot>> {
        for slot in self.all_slots().await {
            if slot.current_execution().await == Some(execution_id) {
                return Some(slot);
            }
        }
        None
    }

    /// Route a reply to whichever slot's broker holds the request.
    ///
    /// Every slot is searched by request id before any is searched by tool
    /// id, so an exact request id in one slot beats a colliding tool id in
    /// another.
    pub async fn respond(&self, response: InteractionResponse) -> RespondOutcome {
        let slots = self.all_slots().await;
        for key in [ReplyKey::RequestId, ReplyKey::ToolId] {
            for slot in &slots {
                if slot.broker().respond_by(response.clone(), key).await
                    == RespondOutcome::Delivered
                {
                    return RespondOutcome::Delivered;
                }
            }
        }
        debug!(request_id = %response.request_id, "No pending interaction matched reply");
        RespondOutcome::NoMatchingRequest
    }

    /// Every outstanding interaction across all slots.
    pub async fn pending_interactions(&self) -> Vec<InteractionRequest> {
        let mut pending = Vec::new();
        for slot in self.all_slots().await {
            pending.extend(slot.broker().pending().await);
        }
        pending
    }

    async fn all_slots(&self) -> Vec<Arc<WorkerSlot>> {
        self.slots.lock().await.values().cloned().collect()
    }
}
