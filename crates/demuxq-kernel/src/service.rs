//! The demultiplexing service.
//!
//! [`DemuxService`] owns the configuration, the compiler registry and the job
//! adapter. It is constructed once by the process and shared by reference
//! with every request handler.
//!
//! A start request runs through four stages, and a failure in any of them is
//! reported tagged with its [`Stage`]:
//!
//! 1. **configure**: resolve the runfolder and build the [`RunConfig`]
//! 2. **compile**: select the compiler and construct the command line
//! 3. **prepare-output**: clear the output directory and link `Unaligned`
//! 4. **submit**: hand the command to the job backend
//!
//! Nothing reaches the backend unless the first three stages succeed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use demuxq_types::{JobId, JobState, StopTarget};
use serde::Serialize;

use crate::compiler::{CompilerRegistry, Demultiplexer};
use crate::config::ServiceConfig;
use crate::error::{DemuxError, DemuxResult, Stage};
use crate::jobs::{JobBackend, JobLifecycleAdapter, JobSpec};
use crate::logs::LogFileProvider;
use crate::run_config::{RunConfig, RunRequest};

/// A command compiled for a runfolder, not yet submitted.
#[derive(Debug, Clone)]
pub struct CompiledRun {
    pub config: RunConfig,
    pub command: String,
    pub demultiplexer: Demultiplexer,
}

/// Result of a successful start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartedJob {
    pub job_id: JobId,
    pub state: JobState,
    pub runfolder: String,
    pub output: PathBuf,
    pub log_file: PathBuf,
    pub command: String,
}

pub struct DemuxService {
    settings: Arc<ServiceConfig>,
    registry: Arc<CompilerRegistry>,
    jobs: JobLifecycleAdapter,
    logs: LogFileProvider,
}

impl DemuxService {
    /// Validate `settings` and build a service submitting to `backend`.
    pub fn new(settings: ServiceConfig, backend: Arc<dyn JobBackend>) -> DemuxResult<Self> {
        settings.validate()?;
        let registry = CompilerRegistry::new(&settings)?;
        let logs = LogFileProvider::new(settings.logs_path.clone());
        tracing::debug!(
            "Service ready with {} tool version(s), runfolders under {}",
            settings.versions.len(),
            settings.runfolder_path.display()
        );
        Ok(Self {
            settings: Arc::new(settings),
            registry: Arc::new(registry),
            jobs: JobLifecycleAdapter::new(backend),
            logs,
        })
    }

    pub fn settings(&self) -> &ServiceConfig {
        &self.settings
    }

    pub fn logs(&self) -> &LogFileProvider {
        &self.logs
    }

    /// Configured tool versions, sorted.
    pub fn versions(&self) -> Vec<String> {
        self.settings.version_names()
    }

    /// Path of the runfolder called `name`.
    pub fn runfolder_path(&self, name: &str) -> DemuxResult<PathBuf> {
        let trimmed = name.trim();
        if trimmed.is_empty()
            || trimmed == "."
            || trimmed == ".."
            || trimmed.contains('/')
            || trimmed.contains('\\')
        {
            return Err(DemuxError::Config(format!(
                "invalid runfolder name {:?}",
                name
            )));
        }
        Ok(self.settings.runfolder_path.join(trimmed))
    }

    /// Run the configure and compile stages without touching the output
    /// area or the backend.
    ///
    /// Reads and may rewrite files in the runfolder, so async callers go
    /// through [`DemuxService::start`], which runs this off the runtime.
    pub fn compile(&self, runfolder_name: &str, request: RunRequest) -> DemuxResult<CompiledRun> {
        let runfolder = self
            .runfolder_path(runfolder_name)
            .map_err(|e| e.at(Stage::Configure))?;
        compile_at(&self.settings, &self.registry, &runfolder, request)
    }

    /// Compile a command for the runfolder, prepare its output directory
    /// and submit it. Returns as soon as the backend accepts the job.
    #[tracing::instrument(level = "info", skip(self, request), err)]
    pub async fn start(&self, runfolder_name: &str, request: RunRequest) -> DemuxResult<StartedJob> {
        let runfolder_path = self
            .runfolder_path(runfolder_name)
            .map_err(|e| e.at(Stage::Configure))?;
        let settings = Arc::clone(&self.settings);
        let registry = Arc::clone(&self.registry);
        let CompiledRun {
            config,
            command,
            demultiplexer,
        } = tokio::task::spawn_blocking(move || {
            compile_at(&settings, &registry, &runfolder_path, request)
        })
        .await
        .map_err(|e| DemuxError::Io(format!("compile task failed: {}", e)).at(Stage::Compile))??;

        let version = demultiplexer.version().await;
        tracing::info!(
            "Demultiplexing {} with {} ({})",
            runfolder_name,
            config.tool_version,
            version
        );

        demultiplexer
            .delete_output(&config)
            .await
            .map_err(|e| e.at(Stage::PrepareOutput))?;
        demultiplexer
            .symlink_output(&config)
            .await
            .map_err(|e| e.at(Stage::PrepareOutput))?;

        let runfolder = config.runfolder_name();
        let log_file = self.logs.log_path(&runfolder);
        let spec = JobSpec {
            command: command.clone(),
            cores: config.core_count,
            work_dir: config.runfolder.clone(),
            stdout: log_file.clone(),
            stderr: log_file.clone(),
        };
        let job_id = self
            .jobs
            .start(spec)
            .await
            .map_err(|e| e.at(Stage::Submit))?;

        Ok(StartedJob {
            job_id,
            state: JobState::Pending,
            runfolder,
            output: config.output,
            log_file,
            command,
        })
    }

    pub async fn status(&self, id: JobId) -> JobState {
        self.jobs.status(id).await
    }

    pub async fn status_all(&self) -> DemuxResult<HashMap<JobId, JobState>> {
        self.jobs.status_all().await
    }

    pub async fn stop(&self, target: StopTarget) -> DemuxResult<Vec<JobId>> {
        self.jobs.stop(target).await
    }

    /// Content of the runfolder's tool log.
    pub async fn read_log(&self, runfolder_name: &str) -> DemuxResult<String> {
        self.runfolder_path(runfolder_name)?;
        self.logs.read_log(runfolder_name.trim()).await
    }
}

/// Configure and compile stages for the runfolder at `runfolder`.
fn compile_at(
    settings: &ServiceConfig,
    registry: &CompilerRegistry,
    runfolder: &Path,
    request: RunRequest,
) -> DemuxResult<CompiledRun> {
    let config =
        RunConfig::new(settings, runfolder, request).map_err(|e| e.at(Stage::Configure))?;

    let demultiplexer = registry
        .create(&config)
        .map_err(|e| e.at(Stage::Compile))?;
    let command = demultiplexer
        .construct_command(&config)
        .map_err(|e| e.at(Stage::Compile))?;

    Ok(CompiledRun {
        config,
        command,
        demultiplexer,
    })
}
