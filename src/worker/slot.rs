//! Worker slot: one isolated execution context bound to a job id.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::InteractionError;
use crate::events::EventBus;
use crate::interaction::{ExecutionRef, InteractionBroker, InteractionHooks};

/// Bookkeeping for the execution currently occupying a slot.
#[derive(Debug)]
struct ActiveExecution {
    execution_id: Uuid,
    cancel: CancellationToken,
    /// Cancelled when the runner drops its `ExecutionHandle`.
    finished: CancellationToken,
}

/// Held by the runner for the lifetime of one execution. Dropping it marks
/// the execution as torn down.
pub struct ExecutionHandle {
    execution_id: Uuid,
    cancel: CancellationToken,
    _finished: DropGuard,
}

impl ExecutionHandle {
    pub fn execution_id(&self) -> Uuid {
        self.execution_id
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn execution_ref(&self) -> ExecutionRef {
        ExecutionRef {
            execution_id: self.execution_id,
            cancel: self.cancel.clone(),
        }
    }
}

/// An occupied worker slot.
pub struct WorkerSlot {
    slot_id: Uuid,
    job_id: String,
    broker: Arc<InteractionBroker>,
    current: Mutex<Option<ActiveExecution>>,
}

impl fmt::Debug for WorkerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerSlot")
            .field("slot_id", &self.slot_id)
            .field("job_id", &self.job_id)
            .finish_non_exhaustive()
    }
}

impl WorkerSlot {
    pub fn new(job_id: impl Into<String>, agent_name: &str, events: EventBus) -> Self {
        let job_id = job_id.into();
        Self {
            slot_id: Uuid::new_v4(),
            broker: Arc::new(InteractionBroker::new(job_id.clone(), agent_name, events)),
            job_id,
            current: Mutex::new(None),
        }
    }

    pub fn slot_id(&self) -> Uuid {
        self.slot_id
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn broker(&self) -> &Arc<InteractionBroker> {
        &self.broker
    }

    /// Bind a new execution to this slot.
    pub async fn begin(&self, execution_id: Uuid) -> ExecutionHandle {
        let cancel = CancellationToken::new();
        let finished = CancellationToken::new();

        let previous = self.current.lock().await.replace(ActiveExecution {
            execution_id,
            cancel: cancel.clone(),
            finished: finished.clone(),
        });
        if let Some(previous) = previous {
            // abort_current() clears a cleanly torn-down execution, so this
            // only trips if the old runner outlived the teardown grace.
            previous.cancel.cancel();
            warn!(
                job_id = %self.job_id,
                previous = %previous.execution_id,
                "Slot rebound while previous execution was still tearing down"
            );
        }

        debug!(job_id = %self.job_id, execution_id = %execution_id, "Execution bound to slot");
        ExecutionHandle {
            execution_id,
            cancel,
            _finished: finished.drop_guard(),
        }
    }

    /// Hooks for the engine running `handle`'s execution.
    pub fn hooks(&self, handle: &ExecutionHandle) -> InteractionHooks {
        InteractionHooks::new(self.broker.clone(), handle.execution_ref())
    }

    /// Interaction context for `execution_id` if it is the slot's current
    /// execution.
    pub async fn execution_ref(&self, execution_id: Uuid) -> Option<ExecutionRef> {
        self.current
            .lock()
            .await
            .as_ref()
            .filter(|a| a.execution_id == execution_id)
            .map(|a| ExecutionRef {
                execution_id: a.execution_id,
                cancel: a.cancel.clone(),
            })
    }

    pub async fn current_execution(&self) -> Option<Uuid> {
        self.current.lock().await.as_ref().map(|a| a.execution_id)
    }

    /// Abort cascade: cancel the running execution, reject its pending
    /// interactions, then wait up to `grace` for the runner to let go.
    ///
    /// A runner that lets go in time is unbound from the slot; one that
    /// overruns stays current until `finish` or the next `begin`.
    ///
    /// Returns the aborted execution id, or `None` if the slot was idle.
    pub async fn abort_current(&self, grace: Duration) -> Option<Uuid> {
        let (execution_id, finished) = {
            let current = self.current.lock().await;
            let active = current.as_ref()?;
            active.cancel.cancel();
            (active.execution_id, active.finished.clone())
        };

        self.broker.reject_all(InteractionError::Aborted).await;

        if tokio::time::timeout(grace, finished.cancelled()).await.is_err() {
            warn!(
                job_id = %self.job_id,
                execution_id = %execution_id,
                grace_ms = grace.as_millis() as u64,
                "Execution did not tear down within grace period"
            );
        } else {
            let mut current = self.current.lock().await;
            if current
                .as_ref()
                .is_some_and(|a| a.execution_id == execution_id)
            {
                *current = None;
            }
        }

        info!(job_id = %self.job_id, execution_id = %execution_id, "Execution aborted");
        Some(execution_id)
    }

    /// Clear the slot's current execution if it is `execution_id`.
    ///
    /// Returns false when the slot has since been rebound to a newer
    /// execution, in which case the caller must leave the slot alone.
    pub async fn finish(&self, execution_id: Uuid) -> bool {
        let mut current = self.current.lock().await;
        match current.as_ref() {
            Some(active) if active.execution_id == execution_id => {
                *current = None;
                true
            }
            Some(_) => false,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot() -> WorkerSlot {
        WorkerSlot::new("job-1", "agent", EventBus::new(16))
    }

    #[tokio::test]
    async fn abort_on_idle_slot_is_none() {
        let slot = slot();
        assert!(slot.abort_current(Duration::from_millis(10)).await.is_none());
    }

    #[tokio::test]
    async fn abort_cancels_and_waits_for_teardown() {
        let slot = Arc::new(slot());
        let id = Uuid::new_v4();
        let handle = slot.begin(id).await;
        let cancel = handle.cancellation();

        let runner = tokio::spawn(async move {
            cancel.cancelled().await;
            drop(handle);
        });

        let aborted = slot.abort_current(Duration::from_secs(5)).await;
        assert_eq!(aborted, Some(id));
        runner.await.unwrap();
        assert_eq!(slot.current_execution().await, None);
        // Unbound already, so completion of the aborted run is a no-op.
        assert!(slot.finish(id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn overrunning_execution_stays_bound_after_abort() {
        let slot = slot();
        let id = Uuid::new_v4();
        let _handle = slot.begin(id).await;

        assert_eq!(slot.abort_current(Duration::from_millis(50)).await, Some(id));
        assert_eq!(slot.current_execution().await, Some(id));
    }

    #[tokio::test]
    async fn reuse_after_clean_abort_binds_fresh_execution() {
        let slot = Arc::new(slot());
        let first = Uuid::new_v4();
        let handle = slot.begin(first).await;
        let cancel = handle.cancellation();
        tokio::spawn(async move {
            cancel.cancelled().await;
            drop(handle);
        });
        slot.abort_current(Duration::from_secs(5)).await;

        let second = Uuid::new_v4();
        let _h2 = slot.begin(second).await;
        assert_eq!(slot.current_execution().await, Some(second));
        assert!(!slot.finish(first).await);
        assert!(slot.execution_ref(first).await.is_none());
    }

    #[test]
    fn debug_names_slot_and_job() {
        let slot = slot();
        let rendered = format!("{slot:?}");
        assert!(rendered.contains("job-1"));
        assert!(rendered.contains(&slot.slot_id().to_string()));
    }

    #[tokio::test]
    async fn finish_only_clears_matching_execution() {
        let slot = slot();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        let _h1 = slot.begin(first).await;
        let _h2 = slot.begin(second).await;

        assert!(!slot.finish(first).await);
        assert_eq!(slot.current_execution().await, Some(second));
        assert!(slot.finish(second).await);
        assert_eq!(slot.current_execution().await, None);
    }

    #[tokio::test]
    async fn execution_ref_requires_current_id() {
        let slot = slot();
        let id = Uuid::new_v4();
        let _handle = slot.begin(id).await;

        assert!(slot.execution_ref(id).await.is_some());
        assert!(slot.execution_ref(Uuid::new_v4()).await.is_none());
    }
}
