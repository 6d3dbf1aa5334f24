//! Per-runfolder tool logs.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{DemuxError, DemuxResult};

/// Locates and reads the log file a runfolder's job writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFileProvider {
    logs_path: PathBuf,
}

impl LogFileProvider {
    pub fn new(logs_path: impl Into<PathBuf>) -> Self {
        Self {
            logs_path: logs_path.into(),
        }
    }

    pub fn logs_path(&self) -> &Path {
        &self.logs_path
    }

    /// `<logs_path>/<runfolder>.log`
    pub fn log_path(&self, runfolder_name: &str) -> PathBuf {
        self.logs_path.join(format!("{}.log", runfolder_name))
    }

    /// Full content of the runfolder's log.
    pub async fn read_log(&self, runfolder_name: &str) -> DemuxResult<String> {
        let path = self.log_path(runfolder_name);
        tokio::fs::read_to_string(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => DemuxError::NotFound(format!(
                "no log for runfolder {} at {}",
                runfolder_name,
                path.display()
            )),
            _ => DemuxError::Io(format!("failed to read {}: {}", path.display(), e)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::Scratch;

    #[test]
    fn log_path_is_named_after_runfolder() {
        let logs = LogFileProvider::new("/var/log/demuxq");
        assert_eq!(
            logs.log_path("150415_ST-E00215_0091_AC6281ANXX"),
            PathBuf::from("/var/log/demuxq/150415_ST-E00215_0091_AC6281ANXX.log")
        );
    }

    #[tokio::test]
    async fn read_log_content_and_missing() {
        let scratch = Scratch::new("logs-read");
        let logs = LogFileProvider::new(scratch.path("logs"));

        let err = logs.read_log("run1").await.unwrap_err();
        assert!(err.is_not_found());

        std::fs::create_dir_all(scratch.path("logs")).unwrap();
        std::fs::write(logs.log_path("run1"), "line one\nline two\n").unwrap();
        assert_eq!(logs.read_log("run1").await.unwrap(), "line one\nline two\n");
    }
}
