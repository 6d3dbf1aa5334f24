//! Job identification and state types.
//!
//! Two vocabularies live here: [`QueueStatus`] is what a job backend reports,
//! [`JobState`] is what callers see. [`JobState::from_queue`] maps one onto
//! the other.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier assigned to a job by the job backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error parsing a job id or stop target.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid job id: {0:?}")]
pub struct ParseJobIdError(pub String);

impl FromStr for JobId {
    type Err = ParseJobIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(JobId)
            .map_err(|_| ParseJobIdError(s.to_string()))
    }
}

/// Caller-visible state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Accepted by the backend, waiting for resources.
    Pending,
    /// Running.
    Started,
    /// Finished successfully.
    Done,
    /// Finished with a failure.
    Error,
    /// Stopped on request.
    Cancelled,
    /// The backend does not know this job.
    Unknown,
}

impl JobState {
    /// Terminal states never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Error | JobState::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Started => "started",
            JobState::Done => "done",
            JobState::Error => "error",
            JobState::Cancelled => "cancelled",
            JobState::Unknown => "unknown",
        }
    }

    /// Translate a backend status into the caller vocabulary.
    ///
    /// Total over every status a backend can report, including values this
    /// crate does not recognize.
    pub fn from_queue(status: &QueueStatus) -> JobState {
        match status {
            QueueStatus::Pending => JobState::Pending,
            QueueStatus::Running => JobState::Started,
            QueueStatus::Completed => JobState::Done,
            QueueStatus::Failed => JobState::Error,
            QueueStatus::Cancelled => JobState::Cancelled,
            QueueStatus::NotFound | QueueStatus::Unrecognized(_) => JobState::Unknown,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a job as reported by a job backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueueStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    NotFound,
    /// A status string the backend reported that has no known meaning.
    Unrecognized(String),
}

impl QueueStatus {
    /// Parse a backend status string. Never fails: anything unknown becomes
    /// [`QueueStatus::Unrecognized`].
    pub fn parse(s: &str) -> QueueStatus {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => QueueStatus::Pending,
            "running" => QueueStatus::Running,
            "completed" => QueueStatus::Completed,
            "failed" => QueueStatus::Failed,
            "cancelled" | "canceled" => QueueStatus::Cancelled,
            "not-found" | "not_found" | "notfound" => QueueStatus::NotFound,
            _ => QueueStatus::Unrecognized(s.to_string()),
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            QueueStatus::Completed | QueueStatus::Failed | QueueStatus::Cancelled
        )
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueStatus::Pending => write!(f, "pending"),
            QueueStatus::Running => write!(f, "running"),
            QueueStatus::Completed => write!(f, "completed"),
            QueueStatus::Failed => write!(f, "failed"),
            QueueStatus::Cancelled => write!(f, "cancelled"),
            QueueStatus::NotFound => write!(f, "not-found"),
            QueueStatus::Unrecognized(s) => write!(f, "{}", s),
        }
    }
}

/// Which jobs a stop request applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopTarget {
    All,
    Job(JobId),
}

impl FromStr for StopTarget {
    type Err = ParseJobIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim() == "all" {
            Ok(StopTarget::All)
        } else {
            s.parse().map(StopTarget::Job)
        }
    }
}
