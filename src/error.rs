//! Error types for the agent scheduler.

use uuid::Uuid;

/// Top-level error type for the coordinator.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Worker pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Interaction error: {0}")]
    Interaction(#[from] InteractionError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Agent engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors surfaced by scheduler-facing operations.
///
/// These are returned as values so the control surface can render them
/// without unwinding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("Scheduler is not running")]
    NotRunning,

    #[error("Invalid schedule: {reason}")]
    InvalidSchedule { reason: String },

    #[error("Computed execution time for job {job_id} is already in the past")]
    AlreadyExpired { job_id: String },

    #[error("Job {job_id} not found")]
    NotFound { job_id: String },

    #[error("Invalid job definition: {reason}")]
    InvalidJob { reason: String },
}

impl SchedulerError {
    pub fn invalid_schedule(reason: impl Into<String>) -> Self {
        Self::InvalidSchedule {
            reason: reason.into(),
        }
    }

    pub fn invalid_job(reason: impl Into<String>) -> Self {
        Self::InvalidJob {
            reason: reason.into(),
        }
    }
}

/// Worker pool errors. Only ever seen internally: a full pool turns into
/// a queued dispatch, not a failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("Worker pool exhausted ({max} slots occupied)")]
    PoolExhausted { max: usize },
}

/// Reasons a pending interaction can be rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InteractionError {
    #[error("Interaction aborted")]
    Aborted,

    #[error("Execution context is gone")]
    ContextGone,

    #[error("Interaction rejected: {0}")]
    Rejected(String),
}

/// Runner-level failures. Always converted into an `execution-complete`
/// event with status `error`; never propagated to the scheduler.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("Execution {execution_id} failed: {source}")]
    ExecutionFailed {
        execution_id: Uuid,
        #[source]
        source: EngineError,
    },

    #[error("Execution {execution_id} panicked: {reason}")]
    Panicked { execution_id: Uuid, reason: String },
}

/// Errors raised by an agent engine implementation.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Agent request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid agent response: {0}")]
    InvalidResponse(String),

    #[error("Interaction failed: {0}")]
    Interaction(#[from] InteractionError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for the coordinator.
pub type Result<T> = std::result::Result<T, Error>;
