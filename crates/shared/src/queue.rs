//! Acquisition task queue.
//!
//! This module provides the persistence side of the engine: creating tasks,
//! claiming them atomically, and writing back terminal outcomes. Every status
//! change is a single conditional `UPDATE` so that concurrent workers (in this
//! process or another one sharing the database file) never both win.

use crate::error::AcquisitionError;
use crate::models::*;
use crate::Database;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

/// Status codes as stored in the `status` column. Only SQL sees these.
const STATUS_CODES: [(TaskStatus, i64); 4] = [
    (TaskStatus::Pending, 0),
    (TaskStatus::Running, 1),
    (TaskStatus::Complete, 2),
    (TaskStatus::Failed, 3),
];

fn status_code(status: TaskStatus) -> i64 {
    STATUS_CODES
        .iter()
        .find(|(s, _)| *s == status)
        .map(|(_, code)| *code)
        .unwrap_or_default()
}

fn status_from_code(code: i64) -> Option<TaskStatus> {
    STATUS_CODES
        .iter()
        .find(|(_, c)| *c == code)
        .map(|(status, _)| *status)
}

const TASK_COLUMNS: &str = "id, target_name, target_artists, target_length_seconds, status,
    created_at, started_at, completed_at, cancel_requested,
    candidate_source_id, candidate_title, candidate_duration_seconds, candidate_url,
    failure_reason";

/// Result of an attempt to claim a specific task
#[derive(Debug, Clone)]
pub enum ClaimOutcome {
    /// The caller now owns the task (status is RUNNING)
    Claimed(AcquisitionTask),
    NotFound,
    /// Someone else claimed it first, or it already finished
    NotPending(TaskStatus),
    /// Another task for the same target is RUNNING
    TargetBusy,
}

/// Storage operations the engine needs from persistence.
///
/// Requesters only create tasks, read them and request cancellation; status
/// transitions belong to the scheduler.
pub trait TaskStore: Send + Sync {
    /// Create a PENDING task, or return the id of the target's existing PENDING task.
    fn enqueue(&self, target: &TargetTrack) -> Result<i64>;

    fn get(&self, task_id: i64) -> Result<Option<AcquisitionTask>>;

    /// Atomically claim a task (PENDING → RUNNING).
    fn claim(&self, task_id: i64) -> Result<ClaimOutcome>;

    /// Atomically claim the oldest PENDING task whose target is not already RUNNING.
    fn claim_next(&self) -> Result<Option<AcquisitionTask>>;

    /// RUNNING → COMPLETE with the selected candidate.
    fn complete(&self, task_id: i64, candidate: &CandidateVideo) -> Result<AcquisitionTask>;

    /// RUNNING → FAILED with a reason.
    fn fail(&self, task_id: i64, reason: &str) -> Result<AcquisitionTask>;

    /// Flag a PENDING or RUNNING task for cancellation. Returns false otherwise.
    fn request_cancel(&self, task_id: i64) -> Result<bool>;

    fn is_cancel_requested(&self, task_id: i64) -> Result<bool>;

    fn list(&self, status: Option<TaskStatus>) -> Result<Vec<AcquisitionTask>>;

    fn stats(&self) -> Result<TaskStats>;
}

/// SQLite-backed task store
pub struct TaskQueue {
    db: Mutex<Database>,
}

impl TaskQueue {
    /// Create a new task queue with the given database
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    /// Open (or create) the database at `path` and wrap it
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Database::open(path)?))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Database>> {
        self.db
            .lock()
            .map_err(|_| anyhow!("Task queue lock poisoned"))
    }

    fn load(db: &Database, task_id: i64) -> Result<Option<AcquisitionTask>> {
        let sql = format!("SELECT {} FROM acquisition_tasks WHERE id = ?1", TASK_COLUMNS);
        db.conn()
            .query_row(&sql, params![task_id], row_to_task)
            .optional()
            .with_context(|| format!("Failed to load task {}", task_id))
    }

    /// Apply a terminal transition in memory, then persist it guarded on RUNNING.
    fn finish<F>(&self, task_id: i64, next: TaskStatus, transition: F) -> Result<AcquisitionTask>
    where
        F: FnOnce(&mut AcquisitionTask, DateTime<Utc>) -> Result<(), AcquisitionError>,
    {
        let db = self.lock()?;
        let mut task = Self::load(&db, task_id)?
            .ok_or_else(|| anyhow!("Task {} not found", task_id))?;

        if let Err(violation) = transition(&mut task, Utc::now()) {
            error!(task_id = task_id, error = %violation, "Illegal task transition");
            return Err(violation.into());
        }

        let (source_id, title, duration, url) = match task.selected_candidate() {
            Some(c) => (
                Some(c.source_id.clone()),
                Some(c.title.clone()),
                Some(c.duration_seconds),
                Some(c.source_url.clone()),
            ),
            None => (None, None, None, None),
        };

        let updated = db.conn().execute(
            "UPDATE acquisition_tasks
             SET status = ?1,
                 completed_at = ?2,
                 candidate_source_id = ?3,
                 candidate_title = ?4,
                 candidate_duration_seconds = ?5,
                 candidate_url = ?6,
                 failure_reason = ?7
             WHERE id = ?8 AND status = ?9",
            params![
                status_code(next),
                task.completed_at,
                source_id,
                title,
                duration,
                url,
                task.failure_reason(),
                task_id,
                status_code(TaskStatus::Running),
            ],
        )?;

        if updated == 0 {
            // Another connection moved it after we loaded it
            let from = Self::load(&db, task_id)?
                .map(|t| t.status())
                .unwrap_or(TaskStatus::Pending);
            let violation = AcquisitionError::ContractViolation {
                task_id,
                from,
                to: next,
            };
            error!(task_id = task_id, error = %violation, "Illegal task transition");
            return Err(violation.into());
        }

        Ok(task)
    }
}

impl TaskStore for TaskQueue {
    fn enqueue(&self, target: &TargetTrack) -> Result<i64> {
        let db = self.lock()?;
        let conn = db.conn();
        let key = target.identity_key();

        match conn.execute(
            "INSERT INTO acquisition_tasks (
                target_name, target_artists, target_length_seconds, target_key,
                status, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                target.name,
                serde_json::to_string(&target.artist_names)?,
                target.length_seconds,
                key,
                status_code(TaskStatus::Pending),
                Utc::now(),
            ],
        ) {
            Ok(_) => {
                let id = conn.last_insert_rowid();
                info!(task_id = id, target = %target.name, "Enqueued acquisition task");
                Ok(id)
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                // A pending task for this target already exists
                let existing_id: i64 = conn.query_row(
                    "SELECT id FROM acquisition_tasks WHERE target_key = ?1 AND status = ?2",
                    params![key, status_code(TaskStatus::Pending)],
                    |row| row.get(0),
                )?;

                debug!(task_id = existing_id, target = %target.name, "Task already pending");
                Ok(existing_id)
            }
            Err(e) => Err(e).context("Failed to insert acquisition task"),
        }
    }

    fn get(&self, task_id: i64) -> Result<Option<AcquisitionTask>> {
        let db = self.lock()?;
        Self::load(&db, task_id)
    }

    fn claim(&self, task_id: i64) -> Result<ClaimOutcome> {
        let db = self.lock()?;

        let sql = format!(
            "UPDATE acquisition_tasks SET status = ?1, started_at = ?2
             WHERE id = ?3 AND status = ?4
               AND NOT EXISTS (
                   SELECT 1 FROM acquisition_tasks AS other
                   WHERE other.target_key = acquisition_tasks.target_key
                     AND other.status = ?1
               )
             RETURNING {}",
            TASK_COLUMNS
        );

        let claimed = db
            .conn()
            .query_row(
                &sql,
                params![
                    status_code(TaskStatus::Running),
                    Utc::now(),
                    task_id,
                    status_code(TaskStatus::Pending),
                ],
                row_to_task,
            )
            .optional()
            .with_context(|| format!("Failed to claim task {}", task_id))?;

        if let Some(task) = claimed {
            debug!(task_id = task_id, "Claimed task");
            return Ok(ClaimOutcome::Claimed(task));
        }

        let outcome = match Self::load(&db, task_id)? {
            None => ClaimOutcome::NotFound,
            Some(task) if task.status() != TaskStatus::Pending => {
                ClaimOutcome::NotPending(task.status())
            }
            Some(_) => ClaimOutcome::TargetBusy,
        };
        debug!(task_id = task_id, outcome = ?outcome, "Task not claimed");
        Ok(outcome)
    }

    fn claim_next(&self) -> Result<Option<AcquisitionTask>> {
        let db = self.lock()?;

        let sql = format!(
            "UPDATE acquisition_tasks SET status = ?1, started_at = ?2
             WHERE id = (
                 SELECT pending.id FROM acquisition_tasks AS pending
                 WHERE pending.status = ?3
                   AND NOT EXISTS (
                       SELECT 1 FROM acquisition_tasks AS running
                       WHERE running.target_key = pending.target_key
                         AND running.status = ?1
                   )
                 ORDER BY pending.created_at ASC, pending.id ASC
                 LIMIT 1
             )
             AND status = ?3
             RETURNING {}",
            TASK_COLUMNS
        );

        let task = db
            .conn()
            .query_row(
                &sql,
                params![
                    status_code(TaskStatus::Running),
                    Utc::now(),
                    status_code(TaskStatus::Pending),
                ],
                row_to_task,
            )
            .optional()
            .context("Failed to claim next task")?;

        if let Some(ref task) = task {
            debug!(task_id = task.id, target = %task.target.name, "Claimed next task");
        }

        Ok(task)
    }

    fn complete(&self, task_id: i64, candidate: &CandidateVideo) -> Result<AcquisitionTask> {
        let task = self.finish(task_id, TaskStatus::Complete, |task, now| {
            task.complete(candidate.clone(), now)
        })?;

        info!(
            task_id = task_id,
            source_id = %candidate.source_id,
            "Task complete"
        );
        Ok(task)
    }

    fn fail(&self, task_id: i64, reason: &str) -> Result<AcquisitionTask> {
        let task = self.finish(task_id, TaskStatus::Failed, |task, now| task.fail(reason, now))?;

        warn!(task_id = task_id, reason = %reason, "Task failed");
        Ok(task)
    }

    fn request_cancel(&self, task_id: i64) -> Result<bool> {
        let db = self.lock()?;

        let updated = db.conn().execute(
            "UPDATE acquisition_tasks SET cancel_requested = 1
             WHERE id = ?1 AND status IN (?2, ?3)",
            params![
                task_id,
                status_code(TaskStatus::Pending),
                status_code(TaskStatus::Running),
            ],
        )?;

        if updated > 0 {
            info!(task_id = task_id, "Cancellation requested");
        }
        Ok(updated > 0)
    }

    fn is_cancel_requested(&self, task_id: i64) -> Result<bool> {
        let db = self.lock()?;

        let flag: Option<bool> = db
            .conn()
            .query_row(
                "SELECT cancel_requested FROM acquisition_tasks WHERE id = ?1",
                params![task_id],
                |row| row.get(0),
            )
            .optional()?;

        Ok(flag.unwrap_or(false))
    }

    fn list(&self, status: Option<TaskStatus>) -> Result<Vec<AcquisitionTask>> {
        let db = self.lock()?;
        let conn = db.conn();

        let tasks = match status {
            Some(status) => {
                let sql = format!(
                    "SELECT {} FROM acquisition_tasks WHERE status = ?1
                     ORDER BY created_at ASC, id ASC",
                    TASK_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![status_code(status)], row_to_task)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM acquisition_tasks ORDER BY created_at ASC, id ASC",
                    TASK_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map([], row_to_task)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };

        Ok(tasks)
    }

    fn stats(&self) -> Result<TaskStats> {
        let db = self.lock()?;
        let conn = db.conn();

        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM acquisition_tasks GROUP BY status")?;
        let mut counts: HashMap<i64, usize> = HashMap::new();

        let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (code, count) = row?;
            counts.insert(code, count as usize);
        }

        let count = |status| counts.get(&status_code(status)).copied().unwrap_or(0);
        let stats = TaskStats {
            pending: count(TaskStatus::Pending),
            running: count(TaskStatus::Running),
            complete: count(TaskStatus::Complete),
            failed: count(TaskStatus::Failed),
            total: counts.values().sum(),
        };

        Ok(stats)
    }
}

fn conversion_error(column: usize, kind: Type, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, kind, message.into())
}

/// Helper: Convert a database row (in `TASK_COLUMNS` order) to a task
fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<AcquisitionTask> {
    let id: i64 = row.get(0)?;

    let artists_json: String = row.get(2)?;
    let artist_names: Vec<String> = serde_json::from_str(&artists_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;

    let code: i64 = row.get(4)?;
    let status = status_from_code(code).ok_or_else(|| {
        conversion_error(4, Type::Integer, format!("unknown status code {}", code))
    })?;

    let state = match status {
        TaskStatus::Pending => TaskState::Pending,
        TaskStatus::Running => TaskState::Running,
        TaskStatus::Complete => {
            let source_id: Option<String> = row.get(9)?;
            let title: Option<String> = row.get(10)?;
            let duration: Option<u32> = row.get(11)?;
            let url: Option<String> = row.get(12)?;
            match (source_id, title, duration, url) {
                (Some(source_id), Some(title), Some(duration_seconds), Some(source_url)) => {
                    TaskState::Complete {
                        selected_candidate: CandidateVideo {
                            title,
                            duration_seconds,
                            source_id,
                            source_url,
                        },
                    }
                }
                _ => {
                    return Err(conversion_error(
                        9,
                        Type::Null,
                        format!("complete task {} has no candidate", id),
                    ))
                }
            }
        }
        TaskStatus::Failed => {
            let reason: Option<String> = row.get(13)?;
            TaskState::Failed {
                failure_reason: reason.ok_or_else(|| {
                    conversion_error(13, Type::Null, format!("failed task {} has no reason", id))
                })?,
            }
        }
    };

    Ok(AcquisitionTask {
        id,
        target: TargetTrack {
            name: row.get(1)?,
            artist_names,
            length_seconds: row.get(3)?,
        },
        state,
        created_at: row.get(5)?,
        started_at: row.get(6)?,
        completed_at: row.get(7)?,
        cancel_requested: row.get(8)?,
    })
}
