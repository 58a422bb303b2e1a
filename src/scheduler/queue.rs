//! Execution queue: strict FIFO backlog of jobs waiting for a worker slot.

use std::collections::VecDeque;

use tracing::debug;

use super::model::{DispatchJob, QueuedJob};

/// FIFO queue of dispatches that found the pool full.
///
/// Not internally synchronized; the scheduler guards it together with the
/// rest of its dispatch state.
#[derive(Debug, Default)]
pub struct ExecutionQueue {
    jobs: VecDeque<QueuedJob>,
}

impl ExecutionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a job. Returns its 1-based position in the queue.
    pub fn push(&mut self, job: DispatchJob) -> usize {
        debug!(job_id = %job.job_id, "Job queued");
        self.jobs.push_back(QueuedJob::new(job));
        self.jobs.len()
    }

    /// The job that would be dispatched next.
    pub fn front(&self) -> Option<&QueuedJob> {
        self.jobs.front()
    }

    /// Remove and return the oldest job.
    pub fn pop(&mut self) -> Option<QueuedJob> {
        self.jobs.pop_front()
    }

    /// Put a job back at the head of the queue after a failed dispatch.
    pub fn restore(&mut self, job: QueuedJob) {
        self.jobs.push_front(job);
    }

    /// Drop every queued job. Returns how many were discarded.
    pub fn clear(&mut self) -> usize {
        let n = self.jobs.len();
        self.jobs.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Copy of the queue contents, oldest first.
    pub fn snapshot(&self) -> Vec<QueuedJob> {
        self.jobs.iter().cloned().collect()
    }
}
