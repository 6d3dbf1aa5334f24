//! Per-request run configuration.
//!
//! A [`RunConfig`] collects everything needed to compile one demultiplexing
//! command, with defaults filled in for whatever the request leaves out.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::basemask::{compute_base_masks, LaneMasks};
use crate::config::ServiceConfig;
use crate::error::{DemuxError, DemuxResult};
use crate::runinfo;
use crate::samplesheet::SampleSheet;

/// Sample sheet file name inside a runfolder.
pub const SAMPLE_SHEET_FILE: &str = "SampleSheet.csv";

/// Base-call directory relative to the runfolder root.
const BASE_CALLS_DIR: &str = "Data/Intensities/BaseCalls";

/// Parameters a caller may set when starting a run. Empty strings count as
/// unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunRequest {
    /// Tool version to use. Derived from the instrument when unset.
    #[serde(alias = "bcl2fastq_version")]
    pub tool_version: Option<String>,
    /// Output directory. Derived from the configured output root when unset.
    pub output: Option<PathBuf>,
    /// Sample sheet content that replaces the runfolder's sample sheet.
    #[serde(alias = "samplesheet")]
    pub sample_sheet: Option<String>,
    pub barcode_mismatches: Option<u32>,
    pub tiles: Option<String>,
    /// Base-mask override, passed to the tool as given.
    #[serde(alias = "use_base_mask")]
    pub base_mask: Option<String>,
    #[serde(alias = "create_indexes")]
    pub create_index_fastqs: bool,
    /// Extra arguments appended verbatim to the command line.
    #[serde(alias = "additional_args")]
    pub extra_args: Option<String>,
    pub core_count: Option<usize>,
}

/// Resolved parameters for one demultiplexing run.
///
/// Built once per request by [`RunConfig::new`] and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub tool_version: String,
    pub runfolder: PathBuf,
    pub base_calls: PathBuf,
    pub sample_sheet: PathBuf,
    pub output: PathBuf,
    pub barcode_mismatches: Option<u32>,
    pub tiles: Option<String>,
    pub base_mask: Option<String>,
    pub create_index_fastqs: bool,
    pub extra_args: Option<String>,
    pub core_count: usize,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

impl RunConfig {
    /// Resolve a request against the runfolder at `runfolder`.
    ///
    /// Writes the request's sample sheet into the runfolder when one is
    /// given; an existing sheet is moved aside first.
    pub fn new(settings: &ServiceConfig, runfolder: &Path, request: RunRequest) -> DemuxResult<Self> {
        match std::fs::metadata(runfolder) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(DemuxError::Config(format!(
                    "runfolder {} is not a directory",
                    runfolder.display()
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DemuxError::NotFound(format!(
                    "runfolder {}",
                    runfolder.display()
                )));
            }
            Err(e) => return Err(e.into()),
        }

        let runfolder_name = runfolder.file_name().ok_or_else(|| {
            DemuxError::Config(format!("runfolder {} has no name", runfolder.display()))
        })?;

        let sample_sheet = runfolder.join(SAMPLE_SHEET_FILE);
        if let Some(content) = non_empty(request.sample_sheet) {
            tracing::debug!("Using sample sheet from request instead of the runfolder's");
            replace_sample_sheet(&sample_sheet, &content)?;
        }

        let tool_version = match non_empty(request.tool_version) {
            Some(version) => version,
            None => runinfo::derive_version(&runinfo::read(runfolder)?, &settings.machine_types)?,
        };

        let output = match request.output {
            Some(path) if !path.as_os_str().is_empty() => path,
            _ => settings.default_output_path.join(runfolder_name),
        };

        let core_count = request
            .core_count
            .filter(|n| *n > 0)
            .unwrap_or_else(num_cpus::get);

        Ok(Self {
            tool_version,
            runfolder: runfolder.to_path_buf(),
            base_calls: runfolder.join(BASE_CALLS_DIR),
            sample_sheet,
            output,
            barcode_mismatches: request.barcode_mismatches,
            tiles: non_empty(request.tiles),
            base_mask: non_empty(request.base_mask),
            create_index_fastqs: request.create_index_fastqs,
            extra_args: non_empty(request.extra_args),
            core_count,
        })
    }

    /// Name of the runfolder directory.
    pub fn runfolder_name(&self) -> String {
        self.runfolder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Base masks per lane, from the runfolder's metadata and sample sheet.
    pub fn lane_masks(&self) -> DemuxResult<LaneMasks> {
        let metadata = runinfo::read(&self.runfolder)?;
        let sheet = SampleSheet::from_path(&self.sample_sheet)?;
        compute_base_masks(
            sheet.samples(),
            &metadata.index_lengths(),
            metadata.is_single_read(),
        )
    }
}

/// Write `content` to `path`, moving any existing file aside with a
/// timestamp suffix.
fn replace_sample_sheet(path: &Path, content: &str) -> DemuxResult<()> {
    if path.exists() {
        let backup = backup_path(path);
        tracing::debug!(
            "Original sample sheet {} moved to {}",
            path.display(),
            backup.display()
        );
        std::fs::rename(path, &backup)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

fn backup_path(path: &Path) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
    let base = format!("{}{}", path.display(), stamp);
    let mut candidate = PathBuf::from(&base);
    let mut n = 1;
    while candidate.exists() {
        candidate = PathBuf::from(format!("{}-{}", base, n));
        n += 1;
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{hiseq_x_run_info, Scratch, UNIFORM_SHEET};

    #[test]
    fn defaults_are_filled_in() {
        let scratch = Scratch::new("runconfig-defaults");
        let runfolder = scratch.runfolder("150415_ST-E00215_0091_AC6281ANXX", &hiseq_x_run_info(), UNIFORM_SHEET);
        let settings = scratch.settings();

        let config = RunConfig::new(&settings, &runfolder, RunRequest::default()).expect("config failed");
        assert_eq!(config.tool_version, "2.20.0");
        assert_eq!(
            config.output,
            settings.default_output_path.join("150415_ST-E00215_0091_AC6281ANXX")
        );
        assert_eq!(config.sample_sheet, runfolder.join("SampleSheet.csv"));
        assert_eq!(config.base_calls, runfolder.join("Data/Intensities/BaseCalls"));
        assert_eq!(config.core_count, num_cpus::get());
        assert_eq!(config.base_mask, None);
    }

    #[test]
    fn explicit_values_win_and_empty_strings_do_not() {
        let scratch = Scratch::new("runconfig-explicit");
        let runfolder = scratch.runfolder("run1", &hiseq_x_run_info(), UNIFORM_SHEET);
        let request = RunRequest {
            tool_version: Some("1.8.4".into()),
            output: Some(PathBuf::from("/elsewhere/run1")),
            tiles: Some(String::new()),
            base_mask: Some("  ".into()),
            barcode_mismatches: Some(2),
            core_count: Some(3),
            ..Default::default()
        };

        let config = RunConfig::new(&scratch.settings(), &runfolder, request).expect("config failed");
        assert_eq!(config.tool_version, "1.8.4");
        assert_eq!(config.output, PathBuf::from("/elsewhere/run1"));
        assert_eq!(config.tiles, None);
        assert_eq!(config.base_mask, None);
        assert_eq!(config.barcode_mismatches, Some(2));
        assert_eq!(config.core_count, 3);
    }

    #[test]
    fn missing_runfolder_is_not_found() {
        let scratch = Scratch::new("runconfig-missing");
        let err = RunConfig::new(&scratch.settings(), &scratch.path("nope"), RunRequest::default())
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn runfolder_that_is_a_file_is_config_error() {
        let scratch = Scratch::new("runconfig-file");
        let file = scratch.path("not-a-dir");
        std::fs::write(&file, "x").unwrap();
        let err = RunConfig::new(&scratch.settings(), &file, RunRequest::default()).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn supplied_sample_sheet_moves_old_one_aside() {
        let scratch = Scratch::new("runconfig-sheet");
        let runfolder = scratch.runfolder("run1", &hiseq_x_run_info(), UNIFORM_SHEET);
        let new_sheet = "[Data]\nLane,Sample_ID,index\n1,NEW,ACGT\n";
        let request = RunRequest {
            sample_sheet: Some(new_sheet.into()),
            ..Default::default()
        };

        RunConfig::new(&scratch.settings(), &runfolder, request).expect("config failed");

        let current = std::fs::read_to_string(runfolder.join("SampleSheet.csv")).unwrap();
        assert_eq!(current, new_sheet);

        let backups: Vec<String> = std::fs::read_dir(&runfolder)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with("SampleSheet.csv") && n != "SampleSheet.csv")
            .collect();
        assert_eq!(backups.len(), 1, "{backups:?}");
        let old = std::fs::read_to_string(runfolder.join(&backups[0])).unwrap();
        assert_eq!(old, UNIFORM_SHEET);
    }

    #[test]
    fn unresolvable_version_is_lookup_error() {
        let scratch = Scratch::new("runconfig-lookup");
        let run_info = crate::testutil::run_info_xml("M01234", &[(1, 151, false)]);
        let runfolder = scratch.runfolder("run1", &run_info, UNIFORM_SHEET);
        let err = RunConfig::new(&scratch.settings(), &runfolder, RunRequest::default()).unwrap_err();
        assert!(matches!(err, DemuxError::Lookup(_)), "{err}");
    }

    #[test]
    fn lane_masks_read_from_runfolder() {
        let scratch = Scratch::new("runconfig-masks");
        let runfolder = scratch.runfolder("run1", &hiseq_x_run_info(), UNIFORM_SHEET);
        let config = RunConfig::new(&scratch.settings(), &runfolder, RunRequest::default()).unwrap();
        let masks = config.lane_masks().expect("masks failed");
        assert_eq!(masks[&1].to_string(), "y*,i8,i8,y*");
        assert_eq!(masks[&2].to_string(), "y*,i8,i8,y*");
    }

    #[test]
    fn request_accepts_legacy_field_names() {
        let request: RunRequest = serde_json::from_str(
            r#"{"bcl2fastq_version": "2.20.0", "use_base_mask": "y*,i8,y*", "additional_args": "--foo", "create_indexes": true}"#,
        )
        .expect("parse failed");
        assert_eq!(request.tool_version.as_deref(), Some("2.20.0"));
        assert_eq!(request.base_mask.as_deref(), Some("y*,i8,y*"));
        assert_eq!(request.extra_args.as_deref(), Some("--foo"));
        assert!(request.create_index_fastqs);
    }
}
