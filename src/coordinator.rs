//! Coordinator: wires the event bus, worker pool, runner and scheduler
//! together and exposes the operations the control surface needs.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::CoordinatorConfig;
use crate::engine::AgentEngine;
use crate::error::{ConfigError, InteractionError, SchedulerError};
use crate::events::{CoordinatorEvent, EventBus};
use crate::interaction::{
    InteractionHooks, InteractionPayload, InteractionRequest, InteractionResponse, RespondOutcome,
};
use crate::scheduler::{DispatchOutcome, JobDefinition, JobPayload, Scheduler, SchedulerSnapshot};
use crate::worker::{ExecutionRunner, WorkerPool};

/// Status report for `GET /api/status`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorStatus {
    pub initialized: bool,
    pub engine: String,
    #[serde(flatten)]
    pub scheduler: SchedulerSnapshot,
}

pub struct Coordinator {
    config: CoordinatorConfig,
    engine_name: String,
    events: EventBus,
    pool: Arc<WorkerPool>,
    scheduler: Scheduler,
}

impl Coordinator {
    /// Build a coordinator. The scheduler starts idle unless
    /// `config.autostart` is set.
    pub fn new(
        config: CoordinatorConfig,
        engine: Arc<dyn AgentEngine>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let events = EventBus::new(config.event_capacity);
        let pool = Arc::new(WorkerPool::new(
            config.max_concurrent,
            config.teardown_grace,
            config.agent_name.clone(),
            events.clone(),
        ));
        let engine_name = engine.name().to_string();
        let runner = Arc::new(ExecutionRunner::new(engine, events.clone()));
        let scheduler = Scheduler::new(
            pool.clone(),
            runner,
            events.clone(),
            config.teardown_grace,
        );

        if config.autostart {
            scheduler.start();
        }

        info!(
            max_concurrent = config.max_concurrent,
            engine = %engine_name,
            autostart = config.autostart,
            "Coordinator initialized"
        );

        Ok(Self {
            config,
            engine_name,
            events,
            pool,
            scheduler,
        })
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.events.subscribe()
    }

    pub fn start(&self) {
        self.scheduler.start();
    }

    pub async fn stop(&self) {
        self.scheduler.stop().await;
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Register (or replace) a recurring task.
    ///
    /// A disabled task is unscheduled instead and yields `None`.
    pub async fn add_task(
        &self,
        payload: JobPayload,
    ) -> Result<Option<DateTime<Utc>>, SchedulerError> {
        let job = JobDefinition::try_from(payload)?;

        if !job.enabled {
            match self.scheduler.unschedule(&job.id).await {
                Ok(()) | Err(SchedulerError::NotFound { .. }) => {}
                Err(e) => return Err(e),
            }
            info!(job_id = %job.id, "Task disabled; not scheduled");
            return Ok(None);
        }

        self.scheduler.schedule(job).await.map(Some)
    }

    pub async fn remove_task(&self, job_id: &str) -> Result<(), SchedulerError> {
        self.scheduler.unschedule(job_id).await
    }

    /// Run a task immediately, outside its schedule.
    pub async fn execute_now(&self, payload: JobPayload) -> Result<DispatchOutcome, SchedulerError> {
        let job = payload.into_dispatch()?;
        Ok(self.scheduler.run_now(job).await)
    }

    pub async fn abort_task(&self, job_id: &str) -> Result<Uuid, SchedulerError> {
        self.scheduler.abort(job_id).await
    }

    /// Deliver a reply from the reply channel.
    pub async fn respond(&self, response: InteractionResponse) -> RespondOutcome {
        let request_id = response.request_id.clone();
        let outcome = self.pool.respond(response).await;
        if outcome == RespondOutcome::NoMatchingRequest {
            warn!(request_id = %request_id, "Reply did not match any pending interaction");
        }
        outcome
    }

    /// Raise an interaction on behalf of a remote engine running
    /// `execution_id`, and wait for the reply.
    pub async fn interact(
        &self,
        execution_id: Uuid,
        payload: InteractionPayload,
        tool_id: Option<String>,
    ) -> Result<serde_json::Value, InteractionError> {
        let slot = self
            .pool
            .find_execution(execution_id)
            .await
            .ok_or(InteractionError::ContextGone)?;
        let execution = slot
            .execution_ref(execution_id)
            .await
            .ok_or(InteractionError::ContextGone)?;

        let hooks = InteractionHooks::new(slot.broker().clone(), execution);
        if let Some(tool_id) = tool_id {
            hooks.observe_tool(tool_id).await;
        }
        hooks.request(payload).await
    }

    pub async fn pending_interactions(&self) -> Vec<InteractionRequest> {
        self.pool.pending_interactions().await
    }

    pub async fn status(&self) -> CoordinatorStatus {
        CoordinatorStatus {
            initialized: true,
            engine: self.engine_name.clone(),
            scheduler: self.scheduler.snapshot().await,
        }
    }

    /// Stop scheduling and tear down every running execution.
    pub async fn shutdown(&self) {
        self.scheduler.stop().await;
        let released = self.pool.release_all().await;
        info!(released, "Coordinator shut down");
    }
}
