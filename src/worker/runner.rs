//! Execution runner: drives one job through the agent engine inside a slot.

use std::sync::Arc;

use tracing::{error, info, warn};

use super::slot::{ExecutionHandle, WorkerSlot};
use super::state::ExecutionStatus;
use crate::engine::{AgentEngine, AgentTask};
use crate::error::{EngineError, ExecutionError, InteractionError};
use crate::events::{CoordinatorEvent, EventBus};
use crate::scheduler::model::DispatchJob;

/// Runs executions and reports their lifecycle on the event bus.
pub struct ExecutionRunner {
    engine: Arc<dyn AgentEngine>,
    events: EventBus,
}

impl ExecutionRunner {
    pub fn new(engine: Arc<dyn AgentEngine>, events: EventBus) -> Self {
        Self { engine, events }
    }

    /// Run `job` to a terminal status.
    ///
    /// Never fails: engine errors and panics become an `error` status. The
    /// handle is dropped on return, which marks the slot's execution as torn
    /// down.
    pub async fn run(
        &self,
        slot: Arc<WorkerSlot>,
        handle: ExecutionHandle,
        job: DispatchJob,
    ) -> ExecutionStatus {
        let execution_id = handle.execution_id();
        let cancel = handle.cancellation();

        info!(
            job_id = %job.job_id,
            execution_id = %execution_id,
            engine = self.engine.name(),
            "Execution starting"
        );
        self.events.emit(CoordinatorEvent::ExecutionStart {
            job_id: job.job_id.clone(),
            execution_id,
            job_name: job.name.clone(),
        });

        let task = AgentTask {
            execution_id,
            job_id: job.job_id.clone(),
            job_name: job.name.clone(),
            instruction: job.instruction(),
        };
        let hooks = slot.hooks(&handle);
        let engine = self.engine.clone();
        let mut engine_call = tokio::spawn(async move { engine.run(task, hooks).await });

        let result = tokio::select! {
            joined = &mut engine_call => match joined {
                Ok(Ok(outcome)) => Ok(outcome),
                Ok(Err(source)) => Err(ExecutionError::ExecutionFailed { execution_id, source }),
                Err(join_err) => Err(ExecutionError::Panicked {
                    execution_id,
                    reason: join_err.to_string(),
                }),
            },
            _ = cancel.cancelled() => {
                engine_call.abort();
                Ok(crate::engine::AgentOutcome::aborted())
            }
        };

        let (status, error) = match result {
            Ok(outcome) => (
                ExecutionStatus::from_stop_reason(outcome.stop_reason.as_deref()),
                None,
            ),
            Err(ExecutionError::ExecutionFailed {
                source: EngineError::Interaction(InteractionError::Aborted),
                ..
            }) => (ExecutionStatus::Abort, None),
            Err(e) if cancel.is_cancelled() => {
                warn!(execution_id = %execution_id, error = %e, "Execution failed while aborting");
                (ExecutionStatus::Abort, None)
            }
            Err(e) => {
                error!(job_id = %job.job_id, execution_id = %execution_id, error = %e, "Execution failed");
                (ExecutionStatus::Error, Some(e.to_string()))
            }
        };

        info!(
            job_id = %job.job_id,
            execution_id = %execution_id,
            status = %status,
            "Execution complete"
        );
        self.events.emit(CoordinatorEvent::ExecutionComplete {
            job_id: job.job_id,
            execution_id,
            status: status.clone(),
            error,
        });

        drop(handle);
        status
    }
}
