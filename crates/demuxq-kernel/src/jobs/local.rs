//! In-process job queue.
//!
//! Jobs are admitted first-in first-out against a fixed pool of cores and
//! run as `sh -c <command>` in their own process group, so cancelling a job
//! also takes down whatever the shell started.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use demuxq_types::{JobId, QueueStatus};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex, Semaphore};

use super::{JobBackend, JobSpec};
use crate::error::{DemuxError, DemuxResult};

struct QueuedJob {
    command: String,
    status: QueueStatus,
    /// Fires when the job is stopped. Taken once.
    cancel: Option<oneshot::Sender<()>>,
}

type JobTable = Arc<Mutex<HashMap<JobId, QueuedJob>>>;

/// A [`JobBackend`] that runs commands on this host.
pub struct LocalQueue {
    next_id: AtomicU64,
    total_cores: u32,
    slots: Arc<Semaphore>,
    jobs: JobTable,
}

impl LocalQueue {
    /// Create a queue managing `total_cores` cores (at least one).
    pub fn new(total_cores: usize) -> Self {
        let total_cores = u32::try_from(total_cores.max(1)).unwrap_or(u32::MAX);
        Self {
            next_id: AtomicU64::new(1),
            total_cores,
            slots: Arc::new(Semaphore::new(total_cores as usize)),
            jobs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn total_cores(&self) -> usize {
        self.total_cores as usize
    }

    /// Command line of a tracked job.
    pub async fn command(&self, id: JobId) -> Option<String> {
        let jobs = self.jobs.lock().await;
        jobs.get(&id).map(|job| job.command.clone())
    }

    fn clamp_cores(&self, requested: usize) -> u32 {
        let requested = u32::try_from(requested).unwrap_or(u32::MAX).max(1);
        if requested > self.total_cores {
            tracing::warn!(
                "Job asked for {} cores but only {} are managed, clamping",
                requested,
                self.total_cores
            );
            self.total_cores
        } else {
            requested
        }
    }
}

impl Default for LocalQueue {
    fn default() -> Self {
        Self::new(num_cpus::get())
    }
}

#[async_trait]
impl JobBackend for LocalQueue {
    async fn start(&self, spec: JobSpec) -> DemuxResult<JobId> {
        let id = JobId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let cores = self.clamp_cores(spec.cores);
        let (cancel_tx, cancel_rx) = oneshot::channel();

        {
            let mut jobs = self.jobs.lock().await;
            jobs.insert(
                id,
                QueuedJob {
                    command: spec.command.clone(),
                    status: QueueStatus::Pending,
                    cancel: Some(cancel_tx),
                },
            );
        }

        tracing::info!("Queued job {} on {} cores: {}", id, cores, spec.command);
        tokio::spawn(run_job(
            id,
            spec,
            cores,
            self.slots.clone(),
            self.jobs.clone(),
            cancel_rx,
        ));
        Ok(id)
    }

    async fn status(&self, id: JobId) -> DemuxResult<QueueStatus> {
        let jobs = self.jobs.lock().await;
        Ok(jobs
            .get(&id)
            .map(|job| job.status.clone())
            .unwrap_or(QueueStatus::NotFound))
    }

    async fn status_all(&self) -> DemuxResult<HashMap<JobId, QueueStatus>> {
        let jobs = self.jobs.lock().await;
        Ok(jobs
            .iter()
            .map(|(id, job)| (*id, job.status.clone()))
            .collect())
    }

    async fn stop(&self, id: JobId) -> DemuxResult<Option<JobId>> {
        let mut jobs = self.jobs.lock().await;
        Ok(jobs.get_mut(&id).and_then(|job| cancel(id, job)))
    }

    async fn stop_all(&self) -> DemuxResult<Vec<JobId>> {
        let mut jobs = self.jobs.lock().await;
        let mut stopped: Vec<JobId> = jobs
            .iter_mut()
            .filter_map(|(id, job)| cancel(*id, job))
            .collect();
        stopped.sort();
        Ok(stopped)
    }
}

/// Mark an unfinished job cancelled and wake its task.
fn cancel(id: JobId, job: &mut QueuedJob) -> Option<JobId> {
    if job.status.is_finished() {
        return None;
    }
    job.status = QueueStatus::Cancelled;
    if let Some(tx) = job.cancel.take() {
        // The task may already have exited; nothing to wake then.
        let _ = tx.send(());
    }
    tracing::info!("Cancelled job {}", id);
    Some(id)
}

async fn set_status(jobs: &JobTable, id: JobId, status: QueueStatus) {
    let mut jobs = jobs.lock().await;
    if let Some(job) = jobs.get_mut(&id) {
        // A stop wins over whatever the task observed afterwards.
        if job.status != QueueStatus::Cancelled {
            job.status = status;
        }
    }
}

async fn run_job(
    id: JobId,
    spec: JobSpec,
    cores: u32,
    slots: Arc<Semaphore>,
    jobs: JobTable,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    let _permit = tokio::select! {
        permit = slots.acquire_many_owned(cores) => match permit {
            Ok(permit) => permit,
            Err(_) => {
                set_status(&jobs, id, QueueStatus::Failed).await;
                return;
            }
        },
        _ = &mut cancel_rx => return,
    };

    let mut child = {
        let mut table = jobs.lock().await;
        let Some(job) = table.get_mut(&id) else { return };
        if job.status == QueueStatus::Cancelled {
            return;
        }

        match spawn(&spec) {
            Ok(child) => {
                job.status = QueueStatus::Running;
                child
            }
            Err(e) => {
                tracing::error!("Job {} failed to start: {}", id, e);
                job.status = QueueStatus::Failed;
                return;
            }
        }
    };
    tracing::debug!("Job {} running as pid {:?}", id, child.id());

    tokio::select! {
        result = child.wait() => {
            let status = match result {
                Ok(exit) if exit.success() => QueueStatus::Completed,
                Ok(exit) => {
                    tracing::info!("Job {} exited with {}", id, exit);
                    QueueStatus::Failed
                }
                Err(e) => {
                    tracing::error!("Job {} could not be waited on: {}", id, e);
                    QueueStatus::Failed
                }
            };
            set_status(&jobs, id, status).await;
        }
        _ = &mut cancel_rx => {
            terminate(id, &mut child);
            if let Err(e) = child.wait().await {
                tracing::warn!("Job {} did not exit cleanly: {}", id, e);
            }
        }
    }
}

fn spawn(spec: &JobSpec) -> DemuxResult<Child> {
    let stdout = open_sink(&spec.stdout)?;
    let stderr = if spec.stderr == spec.stdout {
        stdout.try_clone()?
    } else {
        open_sink(&spec.stderr)?
    };

    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(&spec.command)
        .current_dir(&spec.work_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    cmd.spawn().map_err(|e| {
        DemuxError::Backend(format!("failed to spawn {:?}: {}", spec.command, e))
    })
}

fn open_sink(path: &Path) -> DemuxResult<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| DemuxError::Backend(format!("cannot open {}: {}", path.display(), e)))
}

/// Signal the job's whole process group.
fn terminate(id: JobId, child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            let pgid = nix::unistd::Pid::from_raw(pid as i32);
            match nix::sys::signal::killpg(pgid, nix::sys::signal::Signal::SIGTERM) {
                Ok(()) => return,
                Err(e) => tracing::warn!("killpg for job {} failed: {}", id, e),
            }
        }
    }
    if let Err(e) = child.start_kill() {
        tracing::warn!("Could not kill job {}: {}", id, e);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testutil::Scratch;

    fn spec(scratch: &Scratch, command: &str, cores: usize) -> JobSpec {
        JobSpec {
            command: command.to_string(),
            cores,
            work_dir: scratch.root.clone(),
            stdout: scratch.path("logs/job.log"),
            stderr: scratch.path("logs/job.log"),
        }
    }

    async fn wait_finished(queue: &LocalQueue, id: JobId) -> QueueStatus {
        for _ in 0..500 {
            let status = queue.status(id).await.unwrap();
            if status.is_finished() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} did not finish");
    }

    #[tokio::test]
    async fn job_runs_to_completion() {
        let scratch = Scratch::new("localq-complete");
        let queue = LocalQueue::new(2);

        let id = queue.start(spec(&scratch, "echo hello; echo oops >&2", 1)).await.unwrap();
        assert_eq!(id, JobId(1));
        assert_eq!(wait_finished(&queue, id).await, QueueStatus::Completed);

        let log = std::fs::read_to_string(scratch.path("logs/job.log")).unwrap();
        assert!(log.contains("hello"));
        assert!(log.contains("oops"));
    }

    #[tokio::test]
    async fn failing_command_is_failed() {
        let scratch = Scratch::new("localq-fail");
        let queue = LocalQueue::new(1);
        let id = queue.start(spec(&scratch, "exit 3", 1)).await.unwrap();
        assert_eq!(wait_finished(&queue, id).await, QueueStatus::Failed);
    }

    #[tokio::test]
    async fn runs_in_work_dir() {
        let scratch = Scratch::new("localq-workdir");
        let queue = LocalQueue::new(1);
        let id = queue.start(spec(&scratch, "touch marker", 1)).await.unwrap();
        wait_finished(&queue, id).await;
        assert!(scratch.path("marker").exists());
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let queue = LocalQueue::new(1);
        assert_eq!(queue.status(JobId(42)).await.unwrap(), QueueStatus::NotFound);
        assert_eq!(queue.stop(JobId(42)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn second_job_waits_for_cores() {
        let scratch = Scratch::new("localq-fifo");
        let queue = LocalQueue::new(2);

        let first = queue.start(spec(&scratch, "sleep 5", 2)).await.unwrap();
        let second = queue.start(spec(&scratch, "true", 1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(queue.status(first).await.unwrap(), QueueStatus::Running);
        assert_eq!(queue.status(second).await.unwrap(), QueueStatus::Pending);

        assert_eq!(queue.stop(first).await.unwrap(), Some(first));
        assert_eq!(wait_finished(&queue, second).await, QueueStatus::Completed);
        assert_eq!(queue.status(first).await.unwrap(), QueueStatus::Cancelled);
    }

    #[tokio::test]
    async fn oversized_job_is_clamped() {
        let scratch = Scratch::new("localq-clamp");
        let queue = LocalQueue::new(2);
        let id = queue.start(spec(&scratch, "true", 64)).await.unwrap();
        assert_eq!(wait_finished(&queue, id).await, QueueStatus::Completed);
    }

    #[tokio::test]
    async fn stop_all_cancels_pending_and_running() {
        let scratch = Scratch::new("localq-stop-all");
        let queue = LocalQueue::new(1);

        let running = queue.start(spec(&scratch, "sleep 5", 1)).await.unwrap();
        let pending = queue.start(spec(&scratch, "sleep 5", 1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let stopped = queue.stop_all().await.unwrap();
        assert_eq!(stopped, vec![running, pending]);

        let all = queue.status_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.values().all(|s| *s == QueueStatus::Cancelled));

        // Finished jobs are not cancelled twice.
        assert!(queue.stop_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_work_dir_fails_the_job() {
        let scratch = Scratch::new("localq-bad-workdir");
        let queue = LocalQueue::new(1);
        let mut bad = spec(&scratch, "true", 1);
        bad.work_dir = scratch.path("does/not/exist");
        let id = queue.start(bad).await.unwrap();
        assert_eq!(wait_finished(&queue, id).await, QueueStatus::Failed);
    }
}
