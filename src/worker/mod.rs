//! Worker system: bounded execution slots and the runner that drives them.
//!
//! Core components:
//! - `state`: Execution status and running-execution records
//! - `slot`: One isolated execution context per job id, with its broker
//! - `pool`: Bounded slot allocation with reuse and eviction
//! - `runner`: Engine invocation and lifecycle events for one execution

pub mod pool;
pub mod runner;
pub mod slot;
pub mod state;

pub use pool::WorkerPool;
pub use runner::ExecutionRunner;
pub use slot::{ExecutionHandle, WorkerSlot};
pub use state::{ExecutionStatus, RunningExecution};
