//! Agent Scheduler: recurring task scheduling, a bounded execution pool,
//! and human-in-the-loop interaction checkpoints for agent runs.

pub mod config;
pub mod control;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod events;
pub mod interaction;
pub mod scheduler;
pub mod worker;

pub use config::CoordinatorConfig;
pub use coordinator::{Coordinator, CoordinatorStatus};
pub use error::{Error, Result};
pub use events::{CoordinatorEvent, EventBus};
