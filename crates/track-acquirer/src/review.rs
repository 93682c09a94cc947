//! Review hand-off.
//!
//! A completed task's candidate is published for a human to accept or
//! reject. The sink only reads the task; it never changes its status.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, types::Type};
use serde::Serialize;
use shared::{AcquisitionTask, Database};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

/// Receiver of completed acquisitions
#[async_trait]
pub trait ReviewSink: Send + Sync {
    /// Publish a COMPLETE task. Called once per task.
    async fn publish(&self, task: &AcquisitionTask) -> Result<()>;
}

/// A candidate awaiting (or given) a review decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewItem {
    pub task_id: i64,
    pub target_name: String,
    pub target_artists: Vec<String>,
    pub source_id: String,
    pub source_url: String,
    pub candidate_title: String,
    pub duration_seconds: u32,
    pub published_at: DateTime<Utc>,
    pub decision: Option<String>,
}

/// Review queue stored next to the task table
pub struct SqliteReviewQueue {
    db: Mutex<Database>,
}

impl SqliteReviewQueue {
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Database::open(path)?))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Database>> {
        self.db
            .lock()
            .map_err(|_| anyhow!("Review queue lock poisoned"))
    }

    /// Items with no decision yet, oldest first
    pub fn pending(&self) -> Result<Vec<ReviewItem>> {
        let db = self.lock()?;
        let mut stmt = db.conn().prepare(
            "SELECT task_id, target_name, target_artists, source_id, source_url,
                    candidate_title, duration_seconds, published_at, decision
             FROM review_queue
             WHERE decision IS NULL
             ORDER BY published_at ASC, id ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            let artists: String = row.get(2)?;
            let target_artists = serde_json::from_str(&artists).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e))
            })?;
            Ok(ReviewItem {
                task_id: row.get(0)?,
                target_name: row.get(1)?,
                target_artists,
                source_id: row.get(3)?,
                source_url: row.get(4)?,
                candidate_title: row.get(5)?,
                duration_seconds: row.get(6)?,
                published_at: row.get(7)?,
                decision: row.get(8)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to read review queue")
    }
}

#[async_trait]
impl ReviewSink for SqliteReviewQueue {
    async fn publish(&self, task: &AcquisitionTask) -> Result<()> {
        let candidate = task
            .selected_candidate()
            .ok_or_else(|| anyhow!("Task {} is {}, not complete", task.id, task.status()))?;

        let db = self.lock()?;
        let inserted = db.conn().execute(
            "INSERT INTO review_queue (
                task_id, target_name, target_artists, source_id, source_url,
                candidate_title, duration_seconds, published_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                task.id,
                task.target.name,
                serde_json::to_string(&task.target.artist_names)?,
                candidate.source_id,
                candidate.source_url,
                candidate.title,
                candidate.duration_seconds,
                Utc::now(),
            ],
        );

        match inserted {
            Ok(_) => {
                info!(task_id = task.id, source_id = %candidate.source_id, "Published for review");
                Ok(())
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                bail!("Task {} was already published for review", task.id)
            }
            Err(e) => Err(e).context("Failed to insert review item"),
        }
    }
}
