//! Test utilities for the jobs module.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use tokio::sync::Notify;

use async_trait::async_trait;
use demuxq_types::{JobId, QueueStatus};

use super::{JobBackend, JobSpec};
use crate::error::{DemuxError, DemuxResult};

/// Backend that records calls and reports whatever status a test sets.
#[derive(Default)]
pub struct MockBackend {
    calls: AtomicUsize,
    next_id: AtomicU64,
    fail_status: AtomicBool,
    hold_starts: AtomicBool,
    entered: Notify,
    release: Notify,
    jobs: Mutex<HashMap<JobId, QueueStatus>>,
    specs: Mutex<Vec<JobSpec>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of backend calls of any kind.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Specs passed to `start`, in order.
    pub fn started(&self) -> Vec<JobSpec> {
        self.specs.lock().unwrap().clone()
    }

    pub fn set_status(&self, id: JobId, status: QueueStatus) {
        self.jobs.lock().unwrap().insert(id, status);
    }

    /// Drop a job from the table, as a restarted backend would.
    pub fn forget(&self, id: JobId) {
        self.jobs.lock().unwrap().remove(&id);
    }

    /// Make status queries fail.
    pub fn fail_status(&self, fail: bool) {
        self.fail_status.store(fail, Ordering::SeqCst);
    }

    /// Make `start` pause after accepting a job until [`release_start`].
    ///
    /// [`release_start`]: MockBackend::release_start
    pub fn hold_starts(&self, hold: bool) {
        self.hold_starts.store(hold, Ordering::SeqCst);
    }

    /// Wait until a held `start` has accepted its job.
    pub async fn start_entered(&self) {
        self.entered.notified().await;
    }

    pub fn release_start(&self) {
        self.release.notify_one();
    }

    fn record(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobBackend for MockBackend {
    async fn start(&self, spec: JobSpec) -> DemuxResult<JobId> {
        self.record();
        let id = JobId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.specs.lock().unwrap().push(spec);
        self.jobs.lock().unwrap().insert(id, QueueStatus::Pending);
        if self.hold_starts.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        Ok(id)
    }

    async fn status(&self, id: JobId) -> DemuxResult<QueueStatus> {
        self.record();
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(DemuxError::Backend("mock status failure".into()));
        }
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or(QueueStatus::NotFound))
    }

    async fn status_all(&self) -> DemuxResult<HashMap<JobId, QueueStatus>> {
        self.record();
        Ok(self.jobs.lock().unwrap().clone())
    }

    async fn stop(&self, id: JobId) -> DemuxResult<Option<JobId>> {
        self.record();
        let mut jobs = self.jobs.lock().unwrap();
        match jobs.get_mut(&id) {
            Some(status) if !status.is_finished() => {
                *status = QueueStatus::Cancelled;
                Ok(Some(id))
            }
            _ => Ok(None),
        }
    }

    async fn stop_all(&self) -> DemuxResult<Vec<JobId>> {
        self.record();
        let mut jobs = self.jobs.lock().unwrap();
        let mut stopped: Vec<JobId> = jobs
            .iter_mut()
            .filter(|(_, status)| !status.is_finished())
            .map(|(id, status)| {
                *status = QueueStatus::Cancelled;
                *id
            })
            .collect();
        stopped.sort();
        Ok(stopped)
    }
}
