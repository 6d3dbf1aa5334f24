//! Error taxonomy for demuxq.

use thiserror::Error;

/// Result type for kernel operations.
pub type DemuxResult<T> = Result<T, DemuxError>;

/// Stage of a start request, used to tag failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Resolving the runfolder and building the run configuration.
    Configure,
    /// Selecting a compiler and constructing the command line.
    Compile,
    /// Validating, clearing and linking the output directory.
    PrepareOutput,
    /// Handing the command to the job backend.
    Submit,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Configure => write!(f, "configure"),
            Stage::Compile => write!(f, "compile"),
            Stage::PrepareOutput => write!(f, "prepare-output"),
            Stage::Submit => write!(f, "submit"),
        }
    }
}

/// Kernel errors.
#[derive(Debug, Error)]
pub enum DemuxError {
    /// Malformed sample sheet or run metadata.
    #[error("format error: {0}")]
    Format(String),
    /// Missing runfolder, metadata or log file.
    #[error("not found: {0}")]
    NotFound(String),
    /// Tool version could not be resolved.
    #[error("lookup error: {0}")]
    Lookup(String),
    /// Request or configuration is not acceptable.
    #[error("config error: {0}")]
    Config(String),
    /// The job backend failed.
    #[error("backend error: {0}")]
    Backend(String),
    #[error("io error: {0}")]
    Io(String),
    /// A failure tagged with the stage of the request it happened in.
    #[error("{stage} failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<DemuxError>,
    },
}

impl DemuxError {
    /// Tag this error with the stage it happened in.
    pub fn at(self, stage: Stage) -> DemuxError {
        match self {
            // Keep the innermost stage.
            DemuxError::Stage { .. } => self,
            other => DemuxError::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The underlying error with stage tags removed.
    pub fn root(&self) -> &DemuxError {
        match self {
            DemuxError::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// The stage this error was tagged with, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            DemuxError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Message of the root error without its kind prefix.
    pub fn message(&self) -> String {
        match self.root() {
            DemuxError::Format(m)
            | DemuxError::NotFound(m)
            | DemuxError::Lookup(m)
            | DemuxError::Config(m)
            | DemuxError::Backend(m)
            | DemuxError::Io(m) => m.clone(),
            DemuxError::Stage { .. } => self.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), DemuxError::NotFound(_))
    }

    pub fn is_config(&self) -> bool {
        matches!(self.root(), DemuxError::Config(_))
    }
}

impl From<std::io::Error> for DemuxError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => DemuxError::NotFound(err.to_string()),
            _ => DemuxError::Io(err.to_string()),
        }
    }
}
