//! Drives one claimed task to a terminal state.
//!
//! The runner searches for the target, evaluates candidates in result order,
//! and completes the task with the first one that passes the match decision.
//! Cancellation is checked between candidates and while waiting on the
//! provider; a candidate is never abandoned mid-evaluation.

use crate::review::ReviewSink;
use crate::search::{CandidateStream, SearchProvider};
use anyhow::Result;
use futures::StreamExt;
use shared::config::AcquisitionConfig;
use shared::{AcquisitionError, AcquisitionTask, CandidateVideo, TargetTrack, TaskStore};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use track_matcher::MatchPolicy;

/// Attempts at writing FAILED back before giving up on a task
const WRITE_BACK_ATTEMPTS: u32 = 3;

const WRITE_BACK_RETRY: Duration = Duration::from_millis(200);

fn is_contract_violation(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<AcquisitionError>(),
        Some(AcquisitionError::ContractViolation { .. })
    )
}

/// Terminal task plus what happened at the review hand-off
#[derive(Debug, Clone)]
pub struct RunReport {
    pub task: AcquisitionTask,
    /// Set when a COMPLETE task could not be published for review
    pub review_error: Option<String>,
}

/// Search query for a target: primary artist followed by the track name
pub fn search_query(target: &TargetTrack) -> String {
    format!("{} {}", target.primary_artist(), target.name)
        .trim()
        .to_string()
}

pub struct TaskRunner {
    store: Arc<dyn TaskStore>,
    search: Arc<dyn SearchProvider>,
    review: Arc<dyn ReviewSink>,
    policy: MatchPolicy,
    max_candidates: usize,
    search_timeout: Duration,
}

impl TaskRunner {
    pub fn new(
        store: Arc<dyn TaskStore>,
        search: Arc<dyn SearchProvider>,
        review: Arc<dyn ReviewSink>,
        config: &AcquisitionConfig,
    ) -> Self {
        Self {
            store,
            search,
            review,
            policy: MatchPolicy::new(config.tolerance_seconds),
            max_candidates: config.max_candidates_per_task,
            search_timeout: config.claim_timeout(),
        }
    }

    /// Run a RUNNING task to COMPLETE or FAILED and write the outcome back.
    ///
    /// Every acquisition failure ends up as the task's failure reason. If the
    /// COMPLETE write-back fails the task is failed instead, so it never stays
    /// RUNNING and blocks its target. Errors are contract violations, or a
    /// store that still refuses the FAILED write after retries.
    pub async fn execute(
        &self,
        task: AcquisitionTask,
        cancel: &CancellationToken,
    ) -> Result<RunReport> {
        let task_id = task.id;

        let candidate = match self.find_candidate(&task, cancel).await {
            Ok(candidate) => candidate,
            Err(reason) => {
                let failed = self.record_failure(task_id, &reason.to_string()).await?;
                return Ok(RunReport {
                    task: failed,
                    review_error: None,
                });
            }
        };

        let completed = match self.store.complete(task_id, &candidate) {
            Ok(task) => task,
            Err(e) if is_contract_violation(&e) => return Err(e),
            Err(e) => {
                error!(
                    task_id = task_id,
                    source_id = %candidate.source_id,
                    error = %e,
                    "Failed to record selected candidate"
                );
                let reason = format!("failed to record selected candidate: {:#}", e);
                let failed = self.record_failure(task_id, &reason).await?;
                return Ok(RunReport {
                    task: failed,
                    review_error: None,
                });
            }
        };

        let review_error = match self.review.publish(&completed).await {
            Ok(()) => None,
            Err(e) => {
                error!(task_id = task_id, error = %e, "Failed to publish task for review");
                Some(format!("{:#}", e))
            }
        };

        Ok(RunReport {
            task: completed,
            review_error,
        })
    }

    /// Write FAILED back, retrying store errors other than contract violations.
    async fn record_failure(&self, task_id: i64, reason: &str) -> Result<AcquisitionTask> {
        let mut attempt = 1;
        loop {
            match self.store.fail(task_id, reason) {
                Ok(task) => return Ok(task),
                Err(e) if attempt < WRITE_BACK_ATTEMPTS && !is_contract_violation(&e) => {
                    warn!(
                        task_id = task_id,
                        attempt = attempt,
                        error = %e,
                        "Failure write-back refused, retrying"
                    );
                    attempt += 1;
                    sleep(WRITE_BACK_RETRY).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Cancellation checkpoint
    fn checkpoint(&self, task_id: i64, cancel: &CancellationToken) -> Result<(), AcquisitionError> {
        if cancel.is_cancelled() {
            return Err(AcquisitionError::Cancelled);
        }

        match self.store.is_cancel_requested(task_id) {
            Ok(true) => Err(AcquisitionError::Cancelled),
            Ok(false) => Ok(()),
            Err(e) => {
                warn!(task_id = task_id, error = %e, "Could not read cancellation flag");
                Ok(())
            }
        }
    }

    /// Wait on the provider, bounded by the timeout and interrupted by cancellation.
    async fn wait_for_provider<F, T>(
        &self,
        cancel: &CancellationToken,
        operation: F,
    ) -> Result<T, AcquisitionError>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AcquisitionError::Cancelled),
            result = tokio::time::timeout(self.search_timeout, operation) => {
                result.map_err(|_| AcquisitionError::ProviderTimeout(self.search_timeout))
            }
        }
    }

    async fn find_candidate(
        &self,
        task: &AcquisitionTask,
        cancel: &CancellationToken,
    ) -> Result<CandidateVideo, AcquisitionError> {
        self.checkpoint(task.id, cancel)?;

        let query = search_query(&task.target);
        debug!(task_id = task.id, query = %query, "Searching for candidates");

        let stream: CandidateStream = self
            .wait_for_provider(cancel, self.search.search(&query, self.max_candidates))
            .await??;
        let mut stream = stream.take(self.max_candidates);

        let mut evaluated = 0usize;
        loop {
            self.checkpoint(task.id, cancel)?;

            let candidate = match self.wait_for_provider(cancel, stream.next()).await? {
                Some(result) => result?,
                None => break,
            };
            evaluated += 1;

            if self.policy.is_valid_match(&task.target, &candidate) {
                info!(
                    task_id = task.id,
                    source_id = %candidate.source_id,
                    title = %candidate.title,
                    position = evaluated,
                    "Candidate matched"
                );
                return Ok(candidate);
            }
        }

        info!(
            task_id = task.id,
            evaluated = evaluated,
            "No candidate matched"
        );
        Err(AcquisitionError::NoMatchFound)
    }
}
