//! Bounded worker pool over the task store.
//!
//! Each worker claims one PENDING task at a time and runs it end to end.
//! Claims are atomic in the store, so the pool never runs a task twice and
//! never runs two tasks for the same target at once.

use crate::review::ReviewSink;
use crate::runner::{RunReport, TaskRunner};
use crate::search::SearchProvider;
use anyhow::{anyhow, Result};
use shared::config::AcquisitionConfig;
use shared::{AcquisitionError, AcquisitionTask, ClaimOutcome, TaskStatus, TaskStore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Pause before re-checking a queue whose remaining tasks wait on a busy target
const BUSY_TARGET_RETRY: Duration = Duration::from_millis(250);

/// Pause after the store refuses a claim
const CLAIM_ERROR_BACKOFF: Duration = Duration::from_millis(500);

/// Consecutive claim errors after which a worker gives up
const MAX_CLAIM_ERRORS: u32 = 5;

/// What a worker does next
enum NextStep {
    Run(AcquisitionTask),
    Wait(Duration),
    Drained,
}

/// Per-worker counters, summed over the pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub claimed: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// COMPLETE tasks whose review hand-off failed
    pub review_failures: usize,
    /// Store errors (claims included) and contract violations
    pub errors: usize,
}

impl SchedulerStats {
    fn record(&mut self, report: &RunReport) {
        match report.task.status() {
            TaskStatus::Complete => self.completed += 1,
            TaskStatus::Failed => {
                let cancelled = AcquisitionError::Cancelled.to_string();
                if report.task.failure_reason() == Some(cancelled.as_str()) {
                    self.cancelled += 1;
                } else {
                    self.failed += 1;
                }
            }
            TaskStatus::Pending | TaskStatus::Running => {}
        }

        if report.review_error.is_some() {
            self.review_failures += 1;
        }
    }

    fn merge(&mut self, other: SchedulerStats) {
        self.claimed += other.claimed;
        self.completed += other.completed;
        self.failed += other.failed;
        self.cancelled += other.cancelled;
        self.review_failures += other.review_failures;
        self.errors += other.errors;
    }
}

/// Outcome of [`Scheduler::run_task`]
#[derive(Debug, Clone)]
pub enum TaskRun {
    Finished(RunReport),
    /// The claim was refused; nothing ran
    NotClaimed(ClaimOutcome),
}

pub struct Scheduler {
    store: Arc<dyn TaskStore>,
    runner: TaskRunner,
    poll_interval: Duration,
    /// Cancellation tokens of tasks running in this process
    running: Mutex<HashMap<i64, CancellationToken>>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn TaskStore>,
        search: Arc<dyn SearchProvider>,
        review: Arc<dyn ReviewSink>,
        config: &AcquisitionConfig,
    ) -> Self {
        Self {
            runner: TaskRunner::new(Arc::clone(&store), search, review, config),
            store,
            poll_interval: config.poll_interval(),
            running: Mutex::new(HashMap::new()),
        }
    }

    fn lock_running(&self) -> Result<MutexGuard<'_, HashMap<i64, CancellationToken>>> {
        self.running
            .lock()
            .map_err(|_| anyhow!("Running task registry lock poisoned"))
    }

    /// Claim a specific task and run it.
    pub async fn run_task(&self, task_id: i64) -> Result<TaskRun> {
        match self.store.claim(task_id)? {
            ClaimOutcome::Claimed(task) => Ok(TaskRun::Finished(self.process(task).await?)),
            outcome => {
                debug!(task_id = task_id, outcome = ?outcome, "Task not run");
                Ok(TaskRun::NotClaimed(outcome))
            }
        }
    }

    /// Request cooperative cancellation of a PENDING or RUNNING task.
    ///
    /// Returns false when the task is unknown or already terminal.
    pub fn cancel(&self, task_id: i64) -> Result<bool> {
        let flagged = self.store.request_cancel(task_id)?;

        if let Some(token) = self.lock_running()?.get(&task_id) {
            token.cancel();
        }

        Ok(flagged)
    }

    /// Tasks currently running in this process
    pub fn running_tasks(&self) -> Result<Vec<i64>> {
        let mut ids: Vec<i64> = self.lock_running()?.keys().copied().collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn process(&self, task: AcquisitionTask) -> Result<RunReport> {
        let task_id = task.id;
        let token = CancellationToken::new();
        self.lock_running()?.insert(task_id, token.clone());

        let result = self.runner.execute(task, &token).await;

        self.lock_running()?.remove(&task_id);
        result
    }

    /// Start `workers` workers and wait for them.
    ///
    /// Without `watch`, workers exit once no claimable task is left. With
    /// `watch`, they poll until `shutdown` fires. Tasks already running when
    /// `shutdown` fires are finished, not abandoned.
    pub async fn run(
        self: Arc<Self>,
        workers: usize,
        watch: bool,
        shutdown: CancellationToken,
    ) -> Result<SchedulerStats> {
        let workers = workers.max(1);
        info!(workers = workers, watch = watch, "Starting acquisition workers");

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let scheduler = Arc::clone(&self);
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                scheduler.worker_loop(worker_id, watch, shutdown).await
            }));
        }

        let mut totals = SchedulerStats::default();
        for (worker_id, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(Ok(stats)) => totals.merge(stats),
                Ok(Err(e)) => error!(worker_id = worker_id, error = %e, "Worker failed"),
                Err(e) => error!(worker_id = worker_id, error = %e, "Worker panicked"),
            }
        }

        info!(
            claimed = totals.claimed,
            completed = totals.completed,
            failed = totals.failed,
            cancelled = totals.cancelled,
            review_failures = totals.review_failures,
            errors = totals.errors,
            "Acquisition workers finished"
        );

        Ok(totals)
    }

    /// Whether an idle worker should wait instead of exiting in drain mode.
    fn queue_blocked_on_running(&self) -> Result<bool> {
        if self.lock_running()?.is_empty() {
            return Ok(false);
        }
        Ok(self.store.stats()?.pending > 0)
    }

    fn next_step(&self, watch: bool) -> Result<NextStep> {
        if let Some(task) = self.store.claim_next()? {
            return Ok(NextStep::Run(task));
        }

        Ok(if watch {
            NextStep::Wait(self.poll_interval)
        } else if self.queue_blocked_on_running()? {
            NextStep::Wait(BUSY_TARGET_RETRY)
        } else {
            NextStep::Drained
        })
    }

    async fn worker_loop(
        &self,
        worker_id: usize,
        watch: bool,
        shutdown: CancellationToken,
    ) -> Result<SchedulerStats> {
        info!(worker_id = worker_id, "Acquisition worker started");
        let mut stats = SchedulerStats::default();
        let mut claim_errors = 0u32;

        while !shutdown.is_cancelled() {
            let task = match self.next_step(watch) {
                Ok(NextStep::Run(task)) => {
                    claim_errors = 0;
                    task
                }
                Ok(NextStep::Wait(delay)) => {
                    claim_errors = 0;
                    tokio::select! {
                        _ = sleep(delay) => continue,
                        _ = shutdown.cancelled() => break,
                    }
                }
                Ok(NextStep::Drained) => {
                    debug!(worker_id = worker_id, "No more claimable tasks");
                    break;
                }
                Err(e) => {
                    stats.errors += 1;
                    claim_errors += 1;
                    if claim_errors >= MAX_CLAIM_ERRORS {
                        error!(
                            worker_id = worker_id,
                            attempts = claim_errors,
                            error = %e,
                            "Task store keeps failing, stopping worker"
                        );
                        break;
                    }

                    warn!(worker_id = worker_id, error = %e, "Could not claim a task, backing off");
                    tokio::select! {
                        _ = sleep(CLAIM_ERROR_BACKOFF) => continue,
                        _ = shutdown.cancelled() => break,
                    }
                }
            };

            stats.claimed += 1;
            info!(
                worker_id = worker_id,
                task_id = task.id,
                target = %task.target.name,
                "Processing task"
            );

            match self.process(task).await {
                Ok(report) => {
                    info!(
                        worker_id = worker_id,
                        task_id = report.task.id,
                        status = %report.task.status(),
                        "Task finished"
                    );
                    stats.record(&report);
                }
                Err(e) => {
                    if let Some(violation) = e.downcast_ref::<AcquisitionError>() {
                        error!(worker_id = worker_id, error = %violation, "Contract violation while running task");
                    } else {
                        error!(worker_id = worker_id, error = %e, "Task processing failed");
                    }
                    stats.errors += 1;
                }
            }
        }

        info!(
            worker_id = worker_id,
            completed = stats.completed,
            failed = stats.failed,
            cancelled = stats.cancelled,
            errors = stats.errors,
            "Acquisition worker finished"
        );

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{CandidateVideo, TargetTrack};

    fn report(task: AcquisitionTask, review_error: Option<&str>) -> RunReport {
        RunReport {
            task,
            review_error: review_error.map(str::to_string),
        }
    }

    fn running_task(id: i64) -> AcquisitionTask {
        let target = TargetTrack::new("Breathless", vec!["Slow Magic".into()], 198).unwrap();
        let mut task = AcquisitionTask::new(id, target, chrono::Utc::now());
        task.start(chrono::Utc::now()).unwrap();
        task
    }

    #[test]
    fn test_stats_record() {
        let mut stats = SchedulerStats::default();

        let mut complete = running_task(1);
        complete
            .complete(
                CandidateVideo {
                    title: "Slow Magic - Breathless".into(),
                    duration_seconds: 198,
                    source_id: "a".into(),
                    source_url: "https://www.youtube.com/watch?v=a".into(),
                },
                chrono::Utc::now(),
            )
            .unwrap();
        stats.record(&report(complete, Some("disk full")));

        let mut cancelled = running_task(2);
        cancelled.fail("cancelled", chrono::Utc::now()).unwrap();
        stats.record(&report(cancelled, None));

        let mut failed = running_task(3);
        failed
            .fail(AcquisitionError::NoMatchFound.to_string(), chrono::Utc::now())
            .unwrap();
        stats.record(&report(failed, None));

        assert_eq!(
            stats,
            SchedulerStats {
                claimed: 0,
                completed: 1,
                failed: 1,
                cancelled: 1,
                review_failures: 1,
                errors: 0,
            }
        );

        let mut totals = SchedulerStats::default();
        totals.merge(stats);
        totals.merge(stats);
        assert_eq!(totals.completed, 2);
        assert_eq!(totals.cancelled, 2);
    }
}
