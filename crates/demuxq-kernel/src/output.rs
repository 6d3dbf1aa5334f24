//! Output directory housekeeping.
//!
//! Before a job is submitted its output directory is removed and the
//! runfolder's `Unaligned` link is pointed at it. The two steps are not
//! atomic: a failure between them leaves the runfolder without a link.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use crate::error::{DemuxError, DemuxResult};

/// Name of the link created inside the runfolder.
pub const UNALIGNED_LINK: &str = "Unaligned";

/// Allow-listed roots for output directories.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputArea {
    allowed: Vec<PathBuf>,
}

impl OutputArea {
    pub fn new(allowed: Vec<PathBuf>) -> Self {
        Self {
            allowed: allowed.iter().map(|p| normalize(p)).collect(),
        }
    }

    pub fn allowed(&self) -> &[PathBuf] {
        &self.allowed
    }

    /// Check that `output` sits directly inside an allowed folder.
    pub fn validate_output(&self, output: &Path) -> DemuxResult<()> {
        let parent = normalize(output).parent().map(Path::to_path_buf);
        match parent {
            Some(parent) if self.allowed.contains(&parent) => Ok(()),
            _ => {
                let allowed: Vec<String> = self
                    .allowed
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect();
                let msg = format!(
                    "output directory {} is not inside an allowed folder [{}]",
                    output.display(),
                    allowed.join(", ")
                );
                tracing::error!("{}", msg);
                Err(DemuxError::Config(msg))
            }
        }
    }

    /// Validate `output` and remove it recursively. A missing directory is
    /// not an error.
    pub async fn delete_output(&self, output: &Path) -> DemuxResult<()> {
        self.validate_output(output)?;
        match tokio::fs::remove_dir_all(output).await {
            Ok(()) => {
                tracing::info!("Removed output directory {}", output.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("Output directory {} does not exist", output.display());
                Ok(())
            }
            Err(e) => Err(DemuxError::Io(format!(
                "failed to remove {}: {}",
                output.display(),
                e
            ))),
        }
    }

    /// Create `<runfolder>/Unaligned` pointing at `output`.
    ///
    /// An existing link or file there is replaced. A real directory is
    /// never removed: it may hold earlier results, so it is reported as a
    /// config error instead.
    pub async fn link_unaligned(&self, runfolder: &Path, output: &Path) -> DemuxResult<()> {
        let link = runfolder.join(UNALIGNED_LINK);

        match tokio::fs::symlink_metadata(&link).await {
            Ok(meta) if meta.file_type().is_dir() => {
                let msg = format!(
                    "{} is a directory, refusing to replace it with a link to {}",
                    link.display(),
                    output.display()
                );
                tracing::error!("{}", msg);
                return Err(DemuxError::Config(msg));
            }
            Ok(_) => {
                tracing::warn!("{} already exists, replacing it", link.display());
                tokio::fs::remove_file(&link).await?;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        create_symlink(output, &link).await?;
        tracing::debug!("Linked {} -> {}", link.display(), output.display());
        Ok(())
    }
}

#[cfg(unix)]
async fn create_symlink(target: &Path, link: &Path) -> DemuxResult<()> {
    tokio::fs::symlink(target, link).await.map_err(|e| {
        DemuxError::Io(format!(
            "failed to link {} -> {}: {}",
            link.display(),
            target.display(),
            e
        ))
    })
}

#[cfg(not(unix))]
async fn create_symlink(_target: &Path, link: &Path) -> DemuxResult<()> {
    Err(DemuxError::Config(format!(
        "cannot create {}: symbolic links are only supported on unix",
        link.display()
    )))
}

/// Lexically resolve `.` and `..` so allow-list comparison ignores spelling.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
