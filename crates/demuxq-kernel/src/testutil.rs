//! Fixtures shared by unit tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::{MachineTypeConfig, ServiceConfig, VersionConfig};

static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A fresh scratch directory, removed on drop.
pub struct Scratch {
    pub root: PathBuf,
}

impl Scratch {
    pub fn new(tag: &str) -> Self {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let root = std::env::temp_dir().join(format!(
            "demuxq-{}-{}-{}",
            tag,
            std::process::id(),
            id
        ));
        std::fs::create_dir_all(&root).unwrap();
        Self { root }
    }

    /// Create a runfolder with the given run metadata and sample sheet.
    pub fn runfolder(&self, name: &str, run_info: &str, sample_sheet: &str) -> PathBuf {
        let runfolder = self.root.join("runfolders").join(name);
        std::fs::create_dir_all(&runfolder).unwrap();
        std::fs::write(runfolder.join("RunInfo.xml"), run_info).unwrap();
        std::fs::write(runfolder.join("SampleSheet.csv"), sample_sheet).unwrap();
        runfolder
    }

    /// Service settings rooted in this scratch directory.
    pub fn settings(&self) -> ServiceConfig {
        let output_root = self.root.join("output");
        std::fs::create_dir_all(&output_root).unwrap();
        ServiceConfig {
            runfolder_path: self.root.join("runfolders"),
            default_output_path: output_root.clone(),
            allowed_output_folders: vec![output_root],
            logs_path: self.root.join("logs"),
            total_cores: Some(4),
            poll_interval_ms: 10,
            versions: HashMap::from([
                (
                    "2.20.0".to_string(),
                    VersionConfig {
                        generation: "bcl2fastq2x".into(),
                        binary: "/opt/bcl2fastq/bin/bcl2fastq".into(),
                    },
                ),
                (
                    "1.8.4".to_string(),
                    VersionConfig {
                        generation: "bcl2fastq1x".into(),
                        binary: "configureBclToFastq.pl".into(),
                    },
                ),
            ]),
            machine_types: HashMap::from([
                ("HiSeq X".to_string(), MachineTypeConfig { version: "2.20.0".into() }),
                ("HiSeq 2500".to_string(), MachineTypeConfig { version: "1.8.4".into() }),
            ]),
        }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

/// `RunInfo.xml` content for an instrument and `(number, cycles, is_index)` reads.
pub fn run_info_xml(instrument: &str, reads: &[(u32, u32, bool)]) -> String {
    let reads: String = reads
        .iter()
        .map(|(number, cycles, is_index)| {
            format!(
                "      <Read Number=\"{}\" NumCycles=\"{}\" IsIndexedRead=\"{}\" />\n",
                number,
                cycles,
                if *is_index { "Y" } else { "N" }
            )
        })
        .collect();
    format!(
        "<?xml version=\"1.0\"?>\n<RunInfo Version=\"2\">\n  <Run Id=\"RUN\" Number=\"1\">\n    <Flowcell>FC</Flowcell>\n    <Instrument>{}</Instrument>\n    <Reads>\n{}    </Reads>\n  </Run>\n</RunInfo>\n",
        instrument, reads
    )
}

/// Dual-indexed paired-end HiSeq X run with 8+8 index cycles.
pub fn hiseq_x_run_info() -> String {
    run_info_xml(
        "ST-E00215",
        &[(1, 151, false), (2, 8, true), (3, 8, true), (4, 151, false)],
    )
}

/// Sample sheet with two lanes sharing the same dual 8bp geometry.
pub const UNIFORM_SHEET: &str = "[Header],\nIEMFileVersion,4\n[Data],\nLane,Sample_ID,Sample_Name,index,index2,Sample_Project\n1,S1,S1,ACGTACGT,TTGGCCAA,P\n2,S2,S2,GGGGCCCC,AAAATTTT,P\n";

/// Sample sheet whose lanes need different masks.
pub const MIXED_SHEET: &str = "[Data]\nLane,Sample_ID,Sample_Name,index,index2,Sample_Project\n1,S1,S1,ACGTACGT,TTGGCCAA,P\n2,S2,S2,ACGTAC,,P\n";

pub fn exists(path: &Path) -> bool {
    std::fs::symlink_metadata(path).is_ok()
}
