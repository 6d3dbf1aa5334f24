//! Service configuration.
//!
//! Configuration is loaded from `~/.config/demuxq/config.toml` unless a path
//! is given explicitly.
//!
//! ```toml
//! runfolder_path = "/data/runfolders"
//! default_output_path = "/data/demux"
//! allowed_output_folders = ["/data/demux"]
//! logs_path = "/var/log/demuxq"
//!
//! [versions."2.20.0"]
//! generation = "bcl2fastq2x"
//! binary = "/opt/bcl2fastq/2.20.0/bin/bcl2fastq"
//!
//! [versions."1.8.4"]
//! generation = "bcl2fastq1x"
//! binary = "configureBclToFastq.pl"
//!
//! [machine_types."HiSeq X"]
//! version = "2.20.0"
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::compiler::Generation;
use crate::error::{DemuxError, DemuxResult};

/// Configuration for a demuxq service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Directory holding runfolders, looked up by name.
    #[serde(default = "default_runfolder_path")]
    pub runfolder_path: PathBuf,

    /// Root for output directories when a request names none.
    #[serde(default = "default_output_path")]
    pub default_output_path: PathBuf,

    /// Directories an output directory may be placed directly inside.
    #[serde(default)]
    pub allowed_output_folders: Vec<PathBuf>,

    /// Directory for per-runfolder tool logs.
    #[serde(default = "default_logs_path")]
    pub logs_path: PathBuf,

    /// Cores managed by the local job queue. Defaults to the host's cores.
    #[serde(default)]
    pub total_cores: Option<usize>,

    /// How often `run` polls job status, in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Installed tool versions.
    #[serde(default)]
    pub versions: HashMap<String, VersionConfig>,

    /// Tool version per machine family.
    #[serde(default)]
    pub machine_types: HashMap<String, MachineTypeConfig>,
}

fn default_runfolder_path() -> PathBuf {
    PathBuf::from("/data/runfolders")
}

fn default_output_path() -> PathBuf {
    PathBuf::from("/data/demux")
}

fn default_logs_path() -> PathBuf {
    std::env::temp_dir().join("demuxq-logs")
}

fn default_poll_interval() -> u64 {
    2_000
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            runfolder_path: default_runfolder_path(),
            default_output_path: default_output_path(),
            allowed_output_folders: Vec::new(),
            logs_path: default_logs_path(),
            total_cores: None,
            poll_interval_ms: default_poll_interval(),
            versions: HashMap::new(),
            machine_types: HashMap::new(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    pub fn load() -> DemuxResult<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> DemuxResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DemuxError::Config(format!("failed to read config from {}: {}", path.display(), e))
        })?;

        toml::from_str(&content).map_err(|e| {
            DemuxError::Config(format!("failed to parse config from {}: {}", path.display(), e))
        })
    }

    /// Get the default config file path.
    pub fn config_path() -> DemuxResult<PathBuf> {
        let dirs = ProjectDirs::from("", "", "demuxq").ok_or_else(|| {
            DemuxError::Config("could not determine config directory".to_string())
        })?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Check that every version names a known generation and every machine
    /// type names a configured version.
    pub fn validate(&self) -> DemuxResult<()> {
        for (version, entry) in &self.versions {
            Generation::from_tag(&entry.generation).map_err(|e| {
                DemuxError::Config(format!("version {:?}: {}", version, e.message()))
            })?;
        }
        for (family, entry) in &self.machine_types {
            if !self.versions.contains_key(&entry.version) {
                return Err(DemuxError::Config(format!(
                    "machine type {:?} maps to unconfigured version {:?}",
                    family, entry.version
                )));
            }
        }
        Ok(())
    }

    /// Cores available to the local queue.
    pub fn total_cores(&self) -> usize {
        self.total_cores.unwrap_or_else(num_cpus::get).max(1)
    }

    /// Configured tool versions, sorted.
    pub fn version_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.versions.keys().cloned().collect();
        names.sort();
        names
    }
}

/// An installed tool version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionConfig {
    /// Generation tag, resolved through the compiler registry.
    pub generation: String,

    /// Tool binary. For the legacy generation this is the configure script.
    pub binary: String,
}

/// Tool version for one machine family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineTypeConfig {
    pub version: String,
}
