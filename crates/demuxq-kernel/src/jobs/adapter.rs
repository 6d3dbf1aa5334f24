//! Caller-facing job lifecycle.

use std::collections::HashMap;
use std::sync::Arc;

use demuxq_types::{JobId, JobState, StopTarget};
use tokio::sync::Mutex;

use super::{JobBackend, JobSpec};
use crate::error::DemuxResult;

/// Translates between callers and a [`JobBackend`].
///
/// Keeps the last state seen for every job it has handled so a terminal
/// state, once observed, is what callers keep seeing even if the backend
/// later reports something else.
pub struct JobLifecycleAdapter {
    backend: Arc<dyn JobBackend>,
    last_known: Mutex<HashMap<JobId, JobState>>,
}

impl JobLifecycleAdapter {
    pub fn new(backend: Arc<dyn JobBackend>) -> Self {
        Self {
            backend,
            last_known: Mutex::new(HashMap::new()),
        }
    }

    /// Hand a job to the backend. Returns once it is accepted.
    pub async fn start(&self, spec: JobSpec) -> DemuxResult<JobId> {
        let id = self.backend.start(spec).await?;
        // A status read may already have recorded a later state.
        self.last_known
            .lock()
            .await
            .entry(id)
            .or_insert(JobState::Pending);
        tracing::info!("Started job {}", id);
        Ok(id)
    }

    /// Current state of `id`. Ids the backend does not know are
    /// [`JobState::Unknown`]; this never fails.
    pub async fn status(&self, id: JobId) -> JobState {
        match self.backend.status(id).await {
            Ok(status) => {
                let mut cache = self.last_known.lock().await;
                observe(&mut cache, id, JobState::from_queue(&status))
            }
            Err(e) => {
                tracing::warn!("Status of job {} unavailable: {}", id, e);
                let cache = self.last_known.lock().await;
                cache.get(&id).copied().unwrap_or(JobState::Unknown)
            }
        }
    }

    /// State of every job known to the backend or seen by this adapter.
    pub async fn status_all(&self) -> DemuxResult<HashMap<JobId, JobState>> {
        let reported = self.backend.status_all().await?;
        let mut cache = self.last_known.lock().await;

        let mut states: HashMap<JobId, JobState> = reported
            .iter()
            .map(|(id, status)| (*id, observe(&mut cache, *id, JobState::from_queue(status))))
            .collect();

        for (id, state) in cache.iter() {
            if !states.contains_key(id) {
                let state = if state.is_terminal() { *state } else { JobState::Unknown };
                states.insert(*id, state);
            }
        }
        Ok(states)
    }

    /// Cancel one job or all of them. Returns the ids that were cancelled.
    pub async fn stop(&self, target: StopTarget) -> DemuxResult<Vec<JobId>> {
        let stopped = match target {
            StopTarget::All => self.backend.stop_all().await?,
            StopTarget::Job(id) => self.backend.stop(id).await?.into_iter().collect(),
        };

        let mut cache = self.last_known.lock().await;
        for id in &stopped {
            observe(&mut cache, *id, JobState::Cancelled);
        }
        tracing::info!("Stopped {} job(s)", stopped.len());
        Ok(stopped)
    }
}

/// Record `reported` for `id` unless a terminal state is already known.
fn observe(cache: &mut HashMap<JobId, JobState>, id: JobId, reported: JobState) -> JobState {
    match cache.get(&id) {
        Some(known) if known.is_terminal() => {
            if *known != reported {
                tracing::warn!(
                    "Job {} reported {} after reaching {}, keeping {}",
                    id,
                    reported,
                    known,
                    known
                );
            }
            *known
        }
        _ => {
            if reported != JobState::Unknown {
                cache.insert(id, reported);
            }
            reported
        }
    }
}
