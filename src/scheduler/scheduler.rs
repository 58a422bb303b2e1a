//! Job scheduler: timers, dispatch, and the backpressure queue.
//!
//! The scheduler provides:
//! - `schedule()` / `unschedule()`: arm or cancel a job's timer
//! - `run_now()`: dispatch immediately, bypassing timers
//! - `abort()`: cancel a job's running execution
//! - `start()` / `stop()`: stop also clears timers and the queue
//!
//! Dispatch decisions (capacity check, slot acquisition, queue push, drain)
//! are serialized under one lock so the pool bound holds under concurrent
//! callers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::model::{DispatchJob, JobDefinition, QueuedJob};
use super::queue::ExecutionQueue;
use super::recurrence::next_fire_time;
use crate::error::{PoolError, SchedulerError};
use crate::events::{CoordinatorEvent, EventBus};
use crate::worker::{ExecutionRunner, ExecutionStatus, RunningExecution, WorkerPool};

/// Result of handing a job to the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    #[serde(rename_all = "camelCase")]
    Started { execution_id: Uuid },
    Queued { position: usize },
}

/// An armed job timer.
///
/// The entry stays in the table while its timer is firing; `handle` is
/// taken by the firing task so replacing or removing the entry never aborts
/// a dispatch halfway through.
struct ArmedTimer {
    timer_id: Uuid,
    job: JobDefinition,
    next_fire_at: DateTime<Utc>,
    handle: Option<JoinHandle<()>>,
}

impl ArmedTimer {
    fn cancel(self) {
        if let Some(handle) = self.handle {
            handle.abort();
        }
    }
}

#[derive(Default)]
struct DispatchState {
    queue: ExecutionQueue,
    executions: HashMap<Uuid, RunningExecution>,
}

struct Inner {
    running: AtomicBool,
    timers: Mutex<HashMap<String, ArmedTimer>>,
    dispatch: Mutex<DispatchState>,
    pool: Arc<WorkerPool>,
    runner: Arc<ExecutionRunner>,
    events: EventBus,
    teardown_grace: Duration,
}

/// An armed job as reported by `snapshot()`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledEntry {
    pub job_id: String,
    pub job_name: String,
    pub next_execute_at: DateTime<Utc>,
}

/// Point-in-time view of the scheduler.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerSnapshot {
    pub running: bool,
    pub scheduled: Vec<ScheduledEntry>,
    pub queued: Vec<QueuedJob>,
    pub executions: Vec<RunningExecution>,
    pub occupied_slots: usize,
    pub max_concurrent: usize,
}

/// Schedules jobs onto the worker pool. Cheap to clone.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// Create a new scheduler in the idle state.
    pub fn new(
        pool: Arc<WorkerPool>,
        runner: Arc<ExecutionRunner>,
        events: EventBus,
        teardown_grace: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                running: AtomicBool::new(false),
                timers: Mutex::new(HashMap::new()),
                dispatch: Mutex::new(DispatchState::default()),
                pool,
                runner,
                events,
                teardown_grace,
            }),
        }
    }

    pub fn start(&self) {
        if !self.inner.running.swap(true, Ordering::SeqCst) {
            info!("Scheduler started");
        }
    }

    /// Stop the scheduler: cancel every armed timer and discard the queue.
    /// Running executions are left to finish.
    pub async fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);

        let cancelled = {
            let mut timers = self.inner.timers.lock().await;
            let n = timers.len();
            for (_, timer) in timers.drain() {
                timer.cancel();
            }
            n
        };
        let discarded = self.inner.dispatch.lock().await.queue.clear();

        info!(timers = cancelled, queued = discarded, "Scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Arm (or re-arm) the timer for `job`. Returns the next fire instant.
    pub async fn schedule(&self, job: JobDefinition) -> Result<DateTime<Utc>, SchedulerError> {
        self.schedule_from(job, Utc::now()).await
    }

    /// `schedule` with an explicit notion of "now".
    ///
    /// Fails with `NotRunning`, `InvalidSchedule` or `AlreadyExpired`, checked
    /// in that order.
    pub async fn schedule_from(
        &self,
        job: JobDefinition,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, SchedulerError> {
        let mut timers = self.inner.timers.lock().await;
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }
        let next_fire_at = next_fire_at(&job, now)?;
        self.arm_locked(&mut timers, job, next_fire_at);
        Ok(next_fire_at)
    }

    /// Spawn the timer task for `job` and install it, replacing (and
    /// cancelling) any previous entry for the same job.
    fn arm_locked(
        &self,
        timers: &mut HashMap<String, ArmedTimer>,
        job: JobDefinition,
        next_fire_at: DateTime<Utc>,
    ) {
        let delay = (next_fire_at - Utc::now()).to_std().unwrap_or_default();
        let timer_id = Uuid::new_v4();
        let job_id = job.id.clone();
        let weak = Arc::downgrade(&self.inner);
        let handle = {
            let job_id = job_id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                fire(weak, job_id, timer_id).await;
            })
        };

        let replaced = timers.insert(
            job_id.clone(),
            ArmedTimer {
                timer_id,
                job,
                next_fire_at,
                handle: Some(handle),
            },
        );
        if let Some(old) = replaced {
            old.cancel();
        }

        info!(
            job_id = %job_id,
            next_fire_at = %next_fire_at,
            delay_ms = delay.as_millis() as u64,
            "Job scheduled"
        );
    }

    /// Cancel `job_id`'s timer.
    pub async fn unschedule(&self, job_id: &str) -> Result<(), SchedulerError> {
        let timer = self
            .inner
            .timers
            .lock()
            .await
            .remove(job_id)
            .ok_or_else(|| SchedulerError::NotFound {
                job_id: job_id.to_string(),
            })?;
        timer.cancel();
        info!(job_id = %job_id, "Job unscheduled");
        Ok(())
    }

    /// Dispatch `job` immediately, subject to the same queueing rule as a
    /// fired timer.
    pub async fn run_now(&self, job: DispatchJob) -> DispatchOutcome {
        let mut state = self.inner.dispatch.lock().await;
        self.dispatch_locked(&mut state, job).await
    }

    /// Abort the running execution of `job_id`. The runner then reports
    /// `abort`, frees the slot and drains the queue.
    pub async fn abort(&self, job_id: &str) -> Result<Uuid, SchedulerError> {
        let not_found = || SchedulerError::NotFound {
            job_id: job_id.to_string(),
        };
        let slot = self.inner.pool.slot(job_id).await.ok_or_else(not_found)?;
        slot.abort_current(self.inner.teardown_grace)
            .await
            .ok_or_else(not_found)
    }

    /// Dispatch queued jobs while the pool has room.
    pub async fn drain_queue(&self) -> usize {
        let mut state = self.inner.dispatch.lock().await;
        self.drain_locked(&mut state).await
    }

    pub async fn next_fire_at(&self, job_id: &str) -> Option<DateTime<Utc>> {
        self.inner
            .timers
            .lock()
            .await
            .get(job_id)
            .map(|t| t.next_fire_at)
    }

    pub async fn queue_len(&self) -> usize {
        self.inner.dispatch.lock().await.queue.len()
    }

    pub async fn running_executions(&self) -> Vec<RunningExecution> {
        self.inner
            .dispatch
            .lock()
            .await
            .executions
            .values()
            .cloned()
            .collect()
    }

    pub async fn snapshot(&self) -> SchedulerSnapshot {
        let mut scheduled: Vec<ScheduledEntry> = self
            .inner
            .timers
            .lock()
            .await
            .values()
            .map(|t| ScheduledEntry {
                job_id: t.job.id.clone(),
                job_name: t.job.name.clone(),
                next_execute_at: t.next_fire_at,
            })
            .collect();
        scheduled.sort_by_key(|e| e.next_execute_at);

        let (queued, mut executions) = {
            let state = self.inner.dispatch.lock().await;
            (
                state.queue.snapshot(),
                state.executions.values().cloned().collect::<Vec<_>>(),
            )
        };
        executions.sort_by_key(|e| e.started_at);

        SchedulerSnapshot {
            running: self.is_running(),
            scheduled,
            queued,
            executions,
            occupied_slots: self.inner.pool.occupied().await,
            max_concurrent: self.inner.pool.max_concurrent(),
        }
    }

    async fn dispatch_locked(&self, state: &mut DispatchState, job: DispatchJob) -> DispatchOutcome {
        if !self.inner.pool.can_accept(&job.job_id).await {
            return self.enqueue(state, job);
        }

        match self.start_locked(state, job.clone()).await {
            Ok(execution_id) => DispatchOutcome::Started { execution_id },
            Err(PoolError::PoolExhausted { .. }) => self.enqueue(state, job),
        }
    }

    fn enqueue(&self, state: &mut DispatchState, job: DispatchJob) -> DispatchOutcome {
        let job_id = job.job_id.clone();
        let position = state.queue.push(job);
        info!(job_id = %job_id, position, "Pool full, job added to queue");
        self.inner
            .events
            .emit(CoordinatorEvent::ExecutionQueued { job_id, position });
        DispatchOutcome::Queued { position }
    }

    async fn start_locked(
        &self,
        state: &mut DispatchState,
        job: DispatchJob,
    ) -> Result<Uuid, PoolError> {
        let slot = self.inner.pool.acquire(&job.job_id).await?;
        let execution = RunningExecution::start(&job.job_id);
        let execution_id = execution.execution_id;
        let handle = slot.begin(execution_id).await;
        state.executions.insert(execution_id, execution);

        let scheduler = self.clone();
        let runner = self.inner.runner.clone();
        tokio::spawn(async move {
            let job_id = job.job_id.clone();
            let status = runner.run(slot, handle, job).await;
            scheduler.complete(&job_id, execution_id, status).await;
        });

        Ok(execution_id)
    }

    /// Runner completion: drop the record, free the slot, drain the queue.
    ///
    /// Boxed because draining can start a runner whose task ends here again.
    fn complete<'a>(
        &'a self,
        job_id: &'a str,
        execution_id: Uuid,
        status: ExecutionStatus,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.inner.dispatch.lock().await;
            state.executions.remove(&execution_id);
            self.inner
                .pool
                .release_if_current(job_id, execution_id)
                .await;
            debug!(job_id = %job_id, execution_id = %execution_id, status = %status, "Execution record cleared");
            self.drain_locked(&mut state).await;
        })
    }

    async fn drain_locked(&self, state: &mut DispatchState) -> usize {
        let mut dispatched = 0;
        while let Some(front) = state.queue.front() {
            if !self.inner.pool.can_accept(&front.job_id).await {
                break;
            }
            let Some(queued) = state.queue.pop() else {
                break;
            };
            let job = queued.clone().into_dispatch();
            let job_id = job.job_id.clone();
            match self.start_locked(state, job).await {
                Ok(execution_id) => {
                    info!(job_id = %job_id, execution_id = %execution_id, "Dispatched queued job");
                    dispatched += 1;
                }
                Err(e) => {
                    warn!(job_id = %job_id, error = %e, "Queued job could not start");
                    state.queue.restore(queued);
                    break;
                }
            }
        }
        dispatched
    }
}

fn next_fire_at(job: &JobDefinition, now: DateTime<Utc>) -> Result<DateTime<Utc>, SchedulerError> {
    let next = next_fire_time(&job.schedule, now).ok_or_else(|| {
        SchedulerError::invalid_schedule(format!(
            "cannot compute next execution for {} schedule",
            job.schedule.type_tag()
        ))
    })?;
    if next <= Utc::now() {
        return Err(SchedulerError::AlreadyExpired {
            job_id: job.id.clone(),
        });
    }
    Ok(next)
}

/// Whether `timer_id` still owns `job_id`'s entry.
fn owns_entry(timers: &HashMap<String, ArmedTimer>, job_id: &str, timer_id: Uuid) -> bool {
    timers
        .get(job_id)
        .is_some_and(|timer| timer.timer_id == timer_id)
}

/// Timer callback: dispatch, then re-arm interval jobs.
///
/// The entry is left in place while firing. If it is removed or replaced
/// before the dispatch lock is won, the dispatch is skipped; if that happens
/// during the dispatch, the job is not re-armed.
fn fire(inner: Weak<Inner>, job_id: String, timer_id: Uuid) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let scheduler = Scheduler { inner };

        let job = {
            let mut timers = scheduler.inner.timers.lock().await;
            match timers.get_mut(&job_id) {
                Some(timer) if timer.timer_id == timer_id => {
                    // Detach our own handle so a concurrent replace can't abort us.
                    timer.handle = None;
                    Some(timer.job.clone())
                }
                _ => None,
            }
        };
        let Some(job) = job else {
            debug!(job_id = %job_id, "Stale timer fired; ignoring");
            return;
        };

        let outcome = {
            let mut state = scheduler.inner.dispatch.lock().await;
            if !scheduler.is_running() {
                return;
            }
            if !owns_entry(&*scheduler.inner.timers.lock().await, &job_id, timer_id) {
                debug!(job_id = %job_id, "Job unscheduled while firing; skipping dispatch");
                return;
            }
            scheduler.dispatch_locked(&mut state, job.dispatch_job()).await
        };
        info!(job_id = %job_id, outcome = ?outcome, "Timer fired");

        let mut timers = scheduler.inner.timers.lock().await;
        if !owns_entry(&timers, &job_id, timer_id) {
            debug!(job_id = %job_id, "Job replaced or removed while firing; not re-arming");
            return;
        }
        if !job.schedule.rearms() || !scheduler.is_running() {
            timers.remove(&job_id);
            return;
        }
        match next_fire_at(&job, Utc::now()) {
            Ok(next) => scheduler.arm_locked(&mut timers, job, next),
            Err(e) => {
                timers.remove(&job_id);
                warn!(job_id = %job_id, error = %e, "Failed to re-arm job");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::engine::testing::{Script, ScriptedEngine};
    use crate::scheduler::model::{IntervalUnit, RecurrenceSpec, Step};

    const GRACE: Duration = Duration::from_millis(100);

    fn scheduler(max: usize, script: Script) -> (
        Scheduler,
        Arc<ScriptedEngine>,
        tokio::sync::mpsc::UnboundedReceiver<crate::engine::AgentTask>,
        EventBus,
    ) {
        let events = EventBus::new(256);
        let (engine, started) = ScriptedEngine::new(script);
        let pool = Arc::new(WorkerPool::new(max, GRACE, "agent", events.clone()));
        let runner = Arc::new(ExecutionRunner::new(engine.clone(), events.clone()));
        let scheduler = Scheduler::new(pool, runner, events.clone(), GRACE);
        (scheduler, engine, started, events)
    }

    fn job(id: &str) -> JobDefinition {
        JobDefinition {
            id: id.into(),
            name: format!("Job {id}"),
            steps: vec![Step {
                id: "s1".into(),
                name: "only".into(),
                content: format!("do {id}"),
                order: 0,
            }],
            schedule: RecurrenceSpec::Interval {
                unit: IntervalUnit::Minute,
                value: 1,
            },
            enabled: true,
        }
    }

    async fn wait_for_complete(
        rx: &mut tokio::sync::broadcast::Receiver<CoordinatorEvent>,
        job: &str,
    ) -> ExecutionStatus {
        loop {
            if let CoordinatorEvent::ExecutionComplete { job_id, status, .. } = rx.recv().await.unwrap()
                && job_id == job
            {
                return status;
            }
        }
    }

    /// The complete event is emitted before the scheduler clears its
    /// record; poll until the bookkeeping catches up.
    async fn running_count_settles(scheduler: &Scheduler, expected: usize) {
        for _ in 0..1000 {
            if scheduler.running_executions().await.len() == expected {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("running executions never settled at {expected}");
    }

    /// Wait until the job's timer has moved past `previous`.
    async fn rearmed(scheduler: &Scheduler, job_id: &str, previous: DateTime<Utc>) -> DateTime<Utc> {
        for _ in 0..1000 {
            if let Some(next) = scheduler.next_fire_at(job_id).await
                && next != previous
            {
                return next;
            }
            tokio::task::yield_now().await;
        }
        panic!("{job_id} was never re-armed");
    }

    /// Wait until the job's timer task has claimed its entry and is firing.
    async fn wait_until_firing(scheduler: &Scheduler, job_id: &str) {
        for _ in 0..1000 {
            let firing = scheduler
                .inner
                .timers
                .lock()
                .await
                .get(job_id)
                .is_some_and(|t| t.handle.is_none());
            if firing {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("{job_id} never started firing");
    }

    async fn settle() {
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn schedule_requires_running() {
        let (scheduler, ..) = scheduler(1, Script::Complete);
        assert_eq!(
            scheduler.schedule(job("a")).await.unwrap_err(),
            SchedulerError::NotRunning
        );
    }

    #[tokio::test]
    async fn idle_scheduler_reports_not_running_before_validating() {
        let (scheduler, ..) = scheduler(1, Script::Complete);
        let mut j = job("c");
        j.schedule = RecurrenceSpec::Cron {
            expression: "* * * * *".into(),
        };
        assert_eq!(
            scheduler.schedule(j.clone()).await.unwrap_err(),
            SchedulerError::NotRunning
        );
        let long_ago = Utc::now() - ChronoDuration::hours(2);
        assert_eq!(
            scheduler.schedule_from(job("old"), long_ago).await.unwrap_err(),
            SchedulerError::NotRunning
        );
    }

    #[tokio::test]
    async fn cron_schedule_is_invalid() {
        let (scheduler, ..) = scheduler(1, Script::Complete);
        scheduler.start();
        let mut j = job("c");
        j.schedule = RecurrenceSpec::Cron {
            expression: "* * * * *".into(),
        };
        assert!(matches!(
            scheduler.schedule(j).await,
            Err(SchedulerError::InvalidSchedule { .. })
        ));
    }

    #[tokio::test]
    async fn schedule_in_the_past_is_expired() {
        let (scheduler, ..) = scheduler(1, Script::Complete);
        scheduler.start();
        let long_ago = Utc::now() - ChronoDuration::hours(2);
        assert!(matches!(
            scheduler.schedule_from(job("old"), long_ago).await,
            Err(SchedulerError::AlreadyExpired { .. })
        ));
    }

    #[tokio::test]
    async fn unschedule_twice_reports_not_found() {
        let (scheduler, ..) = scheduler(1, Script::Complete);
        scheduler.start();
        scheduler.schedule(job("a")).await.unwrap();
        assert!(scheduler.next_fire_at("a").await.is_some());

        scheduler.unschedule("a").await.unwrap();
        assert!(matches!(
            scheduler.unschedule("a").await,
            Err(SchedulerError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn rescheduling_replaces_the_timer() {
        let (scheduler, ..) = scheduler(1, Script::Complete);
        scheduler.start();
        let now = Utc::now();
        scheduler.schedule_from(job("a"), now).await.unwrap();
        let later = scheduler
            .schedule_from(job("a"), now + ChronoDuration::minutes(5))
            .await
            .unwrap();
        assert_eq!(scheduler.next_fire_at("a").await, Some(later));
        assert_eq!(scheduler.snapshot().await.scheduled.len(), 1);
    }

    #[tokio::test]
    async fn bounded_concurrency_and_fifo_drain() {
        let (scheduler, engine, mut started, events) = scheduler(1, Script::Gated);
        let mut rx = events.subscribe();
        scheduler.start();

        let a = scheduler.run_now(job("a").dispatch_job()).await;
        assert!(matches!(a, DispatchOutcome::Started { .. }));
        assert_eq!(
            scheduler.run_now(job("b").dispatch_job()).await,
            DispatchOutcome::Queued { position: 1 }
        );
        assert_eq!(
            scheduler.run_now(job("c").dispatch_job()).await,
            DispatchOutcome::Queued { position: 2 }
        );
        assert_eq!(started.recv().await.unwrap().job_id, "a");

        let snapshot = scheduler.snapshot().await;
        assert_eq!(snapshot.occupied_slots, 1);
        assert_eq!(snapshot.queued.len(), 2);
        assert_eq!(snapshot.executions.len(), 1);

        engine.release(1);
        assert_eq!(wait_for_complete(&mut rx, "a").await, ExecutionStatus::Done);
        assert_eq!(started.recv().await.unwrap().job_id, "b");
        assert_eq!(scheduler.queue_len().await, 1);
        assert_eq!(scheduler.snapshot().await.occupied_slots, 1);

        engine.release(1);
        wait_for_complete(&mut rx, "b").await;
        assert_eq!(started.recv().await.unwrap().job_id, "c");

        engine.release(1);
        wait_for_complete(&mut rx, "c").await;
        assert_eq!(scheduler.queue_len().await, 0);
    }

    #[tokio::test]
    async fn failures_still_drain_the_queue() {
        let (scheduler, _engine, mut started, events) = scheduler(1, Script::Fail);
        let mut rx = events.subscribe();
        scheduler.start();

        scheduler.run_now(job("a").dispatch_job()).await;
        scheduler.run_now(job("b").dispatch_job()).await;

        assert_eq!(wait_for_complete(&mut rx, "a").await, ExecutionStatus::Error);
        assert_eq!(wait_for_complete(&mut rx, "b").await, ExecutionStatus::Error);
        assert_eq!(started.recv().await.unwrap().job_id, "a");
        assert_eq!(started.recv().await.unwrap().job_id, "b");
        running_count_settles(&scheduler, 0).await;
    }

    #[tokio::test]
    async fn redispatch_of_running_job_aborts_previous() {
        let (scheduler, _engine, mut started, events) = scheduler(1, Script::Gated);
        let mut rx = events.subscribe();
        scheduler.start();

        let first = scheduler.run_now(job("a").dispatch_job()).await;
        started.recv().await.unwrap();
        let second = scheduler.run_now(job("a").dispatch_job()).await;

        let (DispatchOutcome::Started { execution_id: e1 }, DispatchOutcome::Started { execution_id: e2 }) =
            (first, second)
        else {
            panic!("both dispatches should start: {first:?} {second:?}");
        };
        assert_ne!(e1, e2);

        assert_eq!(wait_for_complete(&mut rx, "a").await, ExecutionStatus::Abort);
        running_count_settles(&scheduler, 1).await;
        let running = scheduler.running_executions().await;
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].execution_id, e2);
        assert_eq!(scheduler.snapshot().await.occupied_slots, 1);
    }

    #[tokio::test]
    async fn abort_frees_slot_for_queued_job() {
        let (scheduler, _engine, mut started, events) = scheduler(1, Script::Gated);
        let mut rx = events.subscribe();
        scheduler.start();

        scheduler.run_now(job("a").dispatch_job()).await;
        scheduler.run_now(job("b").dispatch_job()).await;
        started.recv().await.unwrap();

        scheduler.abort("a").await.unwrap();
        assert_eq!(wait_for_complete(&mut rx, "a").await, ExecutionStatus::Abort);
        assert_eq!(started.recv().await.unwrap().job_id, "b");
        assert!(matches!(
            scheduler.abort("missing").await,
            Err(SchedulerError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn stop_clears_timers_and_queue() {
        let (scheduler, engine, mut started, events) = scheduler(1, Script::Gated);
        let mut rx = events.subscribe();
        scheduler.start();

        scheduler.schedule(job("timer")).await.unwrap();
        scheduler.run_now(job("a").dispatch_job()).await;
        scheduler.run_now(job("queued").dispatch_job()).await;
        started.recv().await.unwrap();

        scheduler.stop().await;
        let snapshot = scheduler.snapshot().await;
        assert!(!snapshot.running);
        assert!(snapshot.scheduled.is_empty());
        assert!(snapshot.queued.is_empty());

        engine.release(1);
        wait_for_complete(&mut rx, "a").await;
        running_count_settles(&scheduler, 0).await;
        assert!(started.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn interval_job_fires_and_rearms_from_dispatch_time() {
        let (scheduler, _engine, mut started, events) = scheduler(1, Script::Complete);
        let mut rx = events.subscribe();
        scheduler.start();

        let first = scheduler.schedule(job("tick")).await.unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(started.recv().await.unwrap().job_id, "tick");
        wait_for_complete(&mut rx, "tick").await;

        // Re-armed relative to the dispatch, one full interval out.
        let next = rearmed(&scheduler, "tick", first).await;
        assert!(next > first);
        let ahead = next - Utc::now();
        assert!(ahead <= ChronoDuration::milliseconds(60_000));
        assert!(ahead > ChronoDuration::milliseconds(55_000));
    }

    #[tokio::test(start_paused = true)]
    async fn unschedule_while_firing_is_final() {
        let (scheduler, _engine, mut started, _events) = scheduler(1, Script::Complete);
        scheduler.start();
        scheduler.schedule(job("a")).await.unwrap();

        // Park the timer between claiming its entry and dispatching.
        let dispatch = scheduler.inner.dispatch.lock().await;
        settle().await;
        tokio::time::advance(Duration::from_secs(61)).await;
        wait_until_firing(&scheduler, "a").await;

        scheduler.unschedule("a").await.unwrap();
        drop(dispatch);
        settle().await;

        assert!(scheduler.next_fire_at("a").await.is_none());
        assert!(started.try_recv().is_err());
        assert!(matches!(
            scheduler.unschedule("a").await,
            Err(SchedulerError::NotFound { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn reschedule_while_firing_keeps_new_timer() {
        let (scheduler, ..) = scheduler(1, Script::Complete);
        scheduler.start();
        scheduler.schedule(job("a")).await.unwrap();

        let dispatch = scheduler.inner.dispatch.lock().await;
        settle().await;
        tokio::time::advance(Duration::from_secs(61)).await;
        wait_until_firing(&scheduler, "a").await;

        let mut daily = job("a");
        daily.schedule = RecurrenceSpec::Interval {
            unit: IntervalUnit::Day,
            value: 1,
        };
        let replaced = scheduler.schedule(daily).await.unwrap();
        drop(dispatch);
        settle().await;

        assert_eq!(scheduler.next_fire_at("a").await, Some(replaced));
        assert!(replaced - Utc::now() > ChronoDuration::hours(23));
    }

    #[tokio::test(start_paused = true)]
    async fn e2e_fired_job_queues_then_drains_and_rearms() {
        let (scheduler, engine, mut started, events) = scheduler(1, Script::Gated);
        let mut rx = events.subscribe();
        scheduler.start();

        scheduler.run_now(job("j2").dispatch_job()).await;
        assert_eq!(started.recv().await.unwrap().job_id, "j2");
        let first = scheduler.schedule(job("j1")).await.unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        loop {
            if let CoordinatorEvent::ExecutionQueued { job_id, position } = rx.recv().await.unwrap()
                && job_id == "j1"
            {
                assert_eq!(position, 1);
                break;
            }
        }
        let next = rearmed(&scheduler, "j1", first).await;
        assert!(next > first);

        engine.release(1);
        wait_for_complete(&mut rx, "j2").await;
        assert_eq!(started.recv().await.unwrap().job_id, "j1");
        assert_eq!(scheduler.queue_len().await, 0);
        assert_eq!(scheduler.next_fire_at("j1").await, Some(next));
    }

    #[tokio::test]
    async fn e2e_schedule_and_run_now_share_single_slot() {
        let (scheduler, engine, mut started, events) = scheduler(1, Script::Gated);
        let mut rx = events.subscribe();
        scheduler.start();

        scheduler.schedule(job("j1")).await.unwrap();
        let outcome = scheduler.run_now(job("j2").dispatch_job()).await;
        assert!(matches!(outcome, DispatchOutcome::Started { .. }));
        let queued = scheduler.run_now(job("j3").dispatch_job()).await;
        assert!(matches!(queued, DispatchOutcome::Queued { .. }));

        assert_eq!(started.recv().await.unwrap().job_id, "j2");
        engine.release(1);
        wait_for_complete(&mut rx, "j2").await;
        assert_eq!(started.recv().await.unwrap().job_id, "j3");
        engine.release(1);
        wait_for_complete(&mut rx, "j3").await;
    }
}
