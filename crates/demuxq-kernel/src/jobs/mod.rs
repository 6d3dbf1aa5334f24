//! Job submission and tracking.
//!
//! [`JobBackend`] is the seam to whatever actually runs processes. The
//! service only ever talks to a [`JobLifecycleAdapter`], which maps backend
//! statuses onto caller-visible [`JobState`]s.
//!
//! [`JobState`]: demuxq_types::JobState

mod adapter;
mod local;
#[cfg(test)]
pub(crate) mod testing;

pub use adapter::JobLifecycleAdapter;
pub use local::LocalQueue;

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use demuxq_types::{JobId, QueueStatus};

use crate::error::DemuxResult;

/// Everything a backend needs to run one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    /// Shell command line.
    pub command: String,
    /// Cores the job occupies while running.
    pub cores: usize,
    pub work_dir: PathBuf,
    pub stdout: PathBuf,
    pub stderr: PathBuf,
}

/// A process scheduler.
///
/// Implementations own admission, ordering and the job table; callers may
/// share one instance across tasks. Failures are reported as
/// [`DemuxError::Backend`](crate::DemuxError::Backend).
#[async_trait]
pub trait JobBackend: Send + Sync {
    /// Enqueue a job and return without waiting for it to run.
    async fn start(&self, spec: JobSpec) -> DemuxResult<JobId>;

    /// Status of one job. Unknown ids report [`QueueStatus::NotFound`].
    async fn status(&self, id: JobId) -> DemuxResult<QueueStatus>;

    /// Status of every job the backend tracks.
    async fn status_all(&self) -> DemuxResult<HashMap<JobId, QueueStatus>>;

    /// Cancel one job. Returns the id if something was cancelled.
    async fn stop(&self, id: JobId) -> DemuxResult<Option<JobId>>;

    /// Cancel every unfinished job. Returns the cancelled ids.
    async fn stop_all(&self) -> DemuxResult<Vec<JobId>>;
}
