//! Scheduling: recurrence math, job timers, and the dispatch queue.
//!
//! - `model`: Job, step and recurrence types plus their wire payloads
//! - `recurrence`: Next-fire computation
//! - `queue`: FIFO backlog for dispatches that found the pool full
//! - `scheduler`: Timers, dispatch and drain

pub mod model;
pub mod queue;
pub mod recurrence;
pub mod scheduler;

pub use model::{
    DispatchJob, IntervalUnit, JobDefinition, JobPayload, QueuedJob, RecurrenceSpec,
    SchedulePayload, Step, StepPayload,
};
pub use queue::ExecutionQueue;
pub use recurrence::next_fire_time;
pub use scheduler::{DispatchOutcome, ScheduledEntry, Scheduler, SchedulerSnapshot};
