//! Test doubles for the search and review collaborators.

#![allow(dead_code)]

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use shared::config::AcquisitionConfig;
use shared::{
    AcquisitionTask, CandidateVideo, ClaimOutcome, SearchError, TargetTrack, TaskQueue, TaskStats,
    TaskStatus, TaskStore,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use track_acquirer::{CandidateStream, ReviewSink, SearchProvider};

/// What the fake provider does for a query
#[derive(Debug, Clone)]
pub enum Script {
    Results(Vec<CandidateVideo>),
    /// The search call itself fails
    Fail(SearchError),
    /// The search call never answers
    Hang,
    /// Each result arrives after a delay
    Slow(Vec<CandidateVideo>, Duration),
    /// Results, then an error in the middle of the stream
    Broken(Vec<CandidateVideo>, SearchError),
}

/// Search provider answering from per-query scripts
pub struct ScriptedSearch {
    scripts: Mutex<HashMap<String, Script>>,
    fallback: Script,
    calls: Mutex<Vec<(String, usize)>>,
    pulled: Arc<AtomicUsize>,
}

impl ScriptedSearch {
    /// Every query gets `script`
    pub fn always(script: Script) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fallback: script,
            calls: Mutex::new(Vec::new()),
            pulled: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Unscripted queries return no results
    pub fn new() -> Self {
        Self::always(Script::Results(Vec::new()))
    }

    pub fn on(self, query: &str, script: Script) -> Self {
        self.scripts.lock().unwrap().insert(query.to_string(), script);
        self
    }

    /// Queries received, with the requested limit
    pub fn calls(&self) -> Vec<(String, usize)> {
        self.calls.lock().unwrap().clone()
    }

    /// Results consumed from all streams so far
    pub fn pulled(&self) -> usize {
        self.pulled.load(Ordering::SeqCst)
    }

    fn counted(&self, items: Vec<Result<CandidateVideo, SearchError>>) -> CandidateStream {
        let pulled = Arc::clone(&self.pulled);
        stream::iter(items)
            .inspect(move |_| {
                pulled.fetch_add(1, Ordering::SeqCst);
            })
            .boxed()
    }
}

#[async_trait]
impl SearchProvider for ScriptedSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<CandidateStream, SearchError> {
        self.calls.lock().unwrap().push((query.to_string(), limit));
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(query)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone());

        match script {
            Script::Results(items) => Ok(self.counted(items.into_iter().map(Ok).collect())),
            Script::Fail(error) => Err(error),
            Script::Hang => {
                futures::future::pending::<()>().await;
                unreachable!()
            }
            Script::Slow(items, delay) => {
                let pulled = Arc::clone(&self.pulled);
                Ok(stream::iter(items)
                    .then(move |item| {
                        let pulled = Arc::clone(&pulled);
                        async move {
                            tokio::time::sleep(delay).await;
                            pulled.fetch_add(1, Ordering::SeqCst);
                            Ok(item)
                        }
                    })
                    .boxed())
            }
            Script::Broken(items, error) => {
                let mut results: Vec<_> = items.into_iter().map(Ok).collect();
                results.push(Err(error));
                Ok(self.counted(results))
            }
        }
    }
}

/// Review sink that records what it is given
#[derive(Default)]
pub struct RecordingSink {
    published: Mutex<Vec<AcquisitionTask>>,
    fail: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn published(&self) -> Vec<AcquisitionTask> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReviewSink for RecordingSink {
    async fn publish(&self, task: &AcquisitionTask) -> Result<()> {
        if self.fail {
            bail!("review queue unreachable");
        }
        self.published.lock().unwrap().push(task.clone());
        Ok(())
    }
}

/// Task store that refuses chosen operations a set number of times, as a
/// locked database would, and otherwise delegates to a real queue
pub struct LockedStore {
    inner: Arc<TaskQueue>,
    complete_errors: AtomicUsize,
    fail_errors: AtomicUsize,
    claim_errors: AtomicUsize,
}

impl LockedStore {
    pub fn new(inner: Arc<TaskQueue>) -> Self {
        Self {
            inner,
            complete_errors: AtomicUsize::new(0),
            fail_errors: AtomicUsize::new(0),
            claim_errors: AtomicUsize::new(0),
        }
    }

    pub fn failing_complete(self, times: usize) -> Self {
        self.complete_errors.store(times, Ordering::SeqCst);
        self
    }

    pub fn failing_fail(self, times: usize) -> Self {
        self.fail_errors.store(times, Ordering::SeqCst);
        self
    }

    pub fn failing_claim_next(self, times: usize) -> Self {
        self.claim_errors.store(times, Ordering::SeqCst);
        self
    }

    fn refuse(counter: &AtomicUsize) -> Result<()> {
        let refused = counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(anyhow!("database is locked"));
        }
        Ok(())
    }
}

impl TaskStore for LockedStore {
    fn enqueue(&self, target: &TargetTrack) -> Result<i64> {
        self.inner.enqueue(target)
    }

    fn get(&self, task_id: i64) -> Result<Option<AcquisitionTask>> {
        self.inner.get(task_id)
    }

    fn claim(&self, task_id: i64) -> Result<ClaimOutcome> {
        self.inner.claim(task_id)
    }

    fn claim_next(&self) -> Result<Option<AcquisitionTask>> {
        Self::refuse(&self.claim_errors)?;
        self.inner.claim_next()
    }

    fn complete(&self, task_id: i64, candidate: &CandidateVideo) -> Result<AcquisitionTask> {
        Self::refuse(&self.complete_errors)?;
        self.inner.complete(task_id, candidate)
    }

    fn fail(&self, task_id: i64, reason: &str) -> Result<AcquisitionTask> {
        Self::refuse(&self.fail_errors)?;
        self.inner.fail(task_id, reason)
    }

    fn request_cancel(&self, task_id: i64) -> Result<bool> {
        self.inner.request_cancel(task_id)
    }

    fn is_cancel_requested(&self, task_id: i64) -> Result<bool> {
        self.inner.is_cancel_requested(task_id)
    }

    fn list(&self, status: Option<TaskStatus>) -> Result<Vec<AcquisitionTask>> {
        self.inner.list(status)
    }

    fn stats(&self) -> Result<TaskStats> {
        self.inner.stats()
    }
}

pub fn video(title: &str, duration_seconds: u32, id: &str) -> CandidateVideo {
    CandidateVideo {
        title: title.to_string(),
        duration_seconds,
        source_id: id.to_string(),
        source_url: format!("https://www.youtube.com/watch?v={}", id),
    }
}

pub fn breathless() -> TargetTrack {
    TargetTrack::new("Breathless", vec!["Slow Magic".into(), "RUNN".into()], 198).unwrap()
}

pub fn cvnt5() -> TargetTrack {
    TargetTrack::new(
        "CVNT5 Of The Caribbean",
        vec![
            "Gareth Emery".into(),
            "Ashley Wallbridge".into(),
            "CVNT5".into(),
        ],
        214,
    )
    .unwrap()
}

/// Short timeouts so failure paths finish quickly
pub fn test_config() -> AcquisitionConfig {
    AcquisitionConfig {
        tolerance_seconds: 5,
        max_candidates_per_task: 10,
        claim_timeout_secs: 1,
        max_concurrent_tasks: 3,
        poll_interval_secs: 1,
    }
}

pub fn open_store(dir: &Path) -> Arc<TaskQueue> {
    Arc::new(TaskQueue::open(dir.join("acquisition.db")).unwrap())
}
