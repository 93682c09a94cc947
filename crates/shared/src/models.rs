//! Data models for the acquisition engine.
//!
//! This module defines the target/candidate records exchanged with the search
//! collaborator and the acquisition task with its lifecycle.

use crate::error::AcquisitionError;
use crate::text::fold;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What an acquisition must find. Read-only once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetTrack {
    pub name: String,
    /// Primary artist first, collaborators after.
    pub artist_names: Vec<String>,
    pub length_seconds: u32,
}

impl TargetTrack {
    /// Validate raw target data.
    ///
    /// Rejects empty names, missing or blank artists and negative lengths so
    /// that malformed targets never become tasks.
    pub fn new(
        name: impl Into<String>,
        artist_names: Vec<String>,
        length_seconds: i64,
    ) -> Result<Self, AcquisitionError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(AcquisitionError::InvalidTarget(
                "track name is empty".to_string(),
            ));
        }
        if artist_names.is_empty() {
            return Err(AcquisitionError::InvalidTarget(format!(
                "no artists given for '{}'",
                name
            )));
        }
        if artist_names.iter().any(|a| a.trim().is_empty()) {
            return Err(AcquisitionError::InvalidTarget(format!(
                "blank artist name for '{}'",
                name
            )));
        }
        if length_seconds < 0 {
            return Err(AcquisitionError::InvalidTarget(format!(
                "negative length {}s for '{}'",
                length_seconds, name
            )));
        }
        let length_seconds = u32::try_from(length_seconds).map_err(|_| {
            AcquisitionError::InvalidTarget(format!(
                "length {}s out of range for '{}'",
                length_seconds, name
            ))
        })?;

        Ok(Self {
            name,
            artist_names,
            length_seconds,
        })
    }

    pub fn primary_artist(&self) -> &str {
        self.artist_names.first().map(String::as_str).unwrap_or("")
    }

    /// Identity used for the one-running-task-per-target rule. Names are
    /// folded the way the matcher folds them, so targets it cannot tell apart
    /// share a key.
    pub fn identity_key(&self) -> String {
        let artists: Vec<String> = self.artist_names.iter().map(|a| fold(a)).collect();
        format!("{}|{}", fold(&self.name), artists.join("|"))
    }
}

/// Unvalidated target as received from a requester (CLI, import file).
#[derive(Debug, Clone, Deserialize)]
pub struct TargetRequest {
    pub name: String,
    pub artists: Vec<String>,
    pub length_seconds: i64,
}

impl TargetRequest {
    pub fn into_target(self) -> Result<TargetTrack, AcquisitionError> {
        TargetTrack::new(self.name, self.artists, self.length_seconds)
    }
}

/// One external search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateVideo {
    pub title: String,
    pub duration_seconds: u32,
    /// Opaque identifier in the external catalog
    pub source_id: String,
    pub source_url: String,
}

/// Task status without payload (filters, stats, persistence)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Complete,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Complete | TaskStatus::Failed)
    }

    /// PENDING → RUNNING → COMPLETE | FAILED, nothing else.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Running, TaskStatus::Complete)
                | (TaskStatus::Running, TaskStatus::Failed)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Complete => write!(f, "complete"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "complete" => Ok(TaskStatus::Complete),
            "failed" => Ok(TaskStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid task status: {}", s)),
        }
    }
}

/// Lifecycle state. The selected candidate exists only on `Complete` and the
/// failure reason only on `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Running,
    Complete { selected_candidate: CandidateVideo },
    Failed { failure_reason: String },
}

impl TaskState {
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskState::Pending => TaskStatus::Pending,
            TaskState::Running => TaskStatus::Running,
            TaskState::Complete { .. } => TaskStatus::Complete,
            TaskState::Failed { .. } => TaskStatus::Failed,
        }
    }
}

/// Persisted unit of work tracking one acquisition attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionTask {
    pub id: i64,
    pub target: TargetTrack,
    pub state: TaskState,

    // Timestamps
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    pub cancel_requested: bool,
}

impl AcquisitionTask {
    pub fn new(id: i64, target: TargetTrack, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            target,
            state: TaskState::Pending,
            created_at,
            started_at: None,
            completed_at: None,
            cancel_requested: false,
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.state.status()
    }

    pub fn selected_candidate(&self) -> Option<&CandidateVideo> {
        match &self.state {
            TaskState::Complete { selected_candidate } => Some(selected_candidate),
            _ => None,
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match &self.state {
            TaskState::Failed { failure_reason } => Some(failure_reason),
            _ => None,
        }
    }

    /// PENDING → RUNNING
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), AcquisitionError> {
        self.check_transition(TaskStatus::Running)?;
        self.state = TaskState::Running;
        self.started_at = Some(now);
        Ok(())
    }

    /// RUNNING → COMPLETE
    pub fn complete(
        &mut self,
        candidate: CandidateVideo,
        now: DateTime<Utc>,
    ) -> Result<(), AcquisitionError> {
        self.check_transition(TaskStatus::Complete)?;
        self.state = TaskState::Complete {
            selected_candidate: candidate,
        };
        self.completed_at = Some(now);
        Ok(())
    }

    /// RUNNING → FAILED
    pub fn fail(
        &mut self,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), AcquisitionError> {
        self.check_transition(TaskStatus::Failed)?;
        self.state = TaskState::Failed {
            failure_reason: reason.into(),
        };
        self.completed_at = Some(now);
        Ok(())
    }

    fn check_transition(&self, next: TaskStatus) -> Result<(), AcquisitionError> {
        let current = self.status();
        if current.can_transition_to(next) {
            Ok(())
        } else {
            Err(AcquisitionError::ContractViolation {
                task_id: self.id,
                from: current,
                to: next,
            })
        }
    }
}

/// Task counts by status
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskStats {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub complete: usize,
    pub failed: usize,
}
