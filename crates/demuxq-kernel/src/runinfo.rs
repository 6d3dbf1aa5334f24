//! Run metadata reader.
//!
//! Reads `RunInfo.xml` from the root of a runfolder and resolves which tool
//! version a run should be demultiplexed with.

use std::collections::HashMap;
use std::path::Path;

use demuxq_types::{ReadDescriptor, RunMetadata};
use serde::Deserialize;

use crate::config::MachineTypeConfig;
use crate::error::{DemuxError, DemuxResult};

/// File name of the run metadata, relative to the runfolder root.
pub const RUN_INFO_FILE: &str = "RunInfo.xml";

/// Instrument-name prefixes and the machine family they identify.
///
/// Lookups pick the longest matching prefix, so more specific entries win
/// over shorter ones regardless of their position here.
pub const INSTRUMENT_PREFIXES: &[(&str, &str)] = &[
    ("M", "MiSeq"),
    ("D", "HiSeq 2500"),
    ("SN", "HiSeq 2000"),
    ("ST", "HiSeq X"),
    ("A", "NovaSeq"),
    ("NS", "NextSeq 500"),
    ("K", "HiSeq 4000"),
    ("FS", "ISeq 100"),
    ("LH", "NovaSeq X Plus"),
];

#[derive(Debug, Deserialize)]
struct RunInfoXml {
    #[serde(rename = "Run")]
    run: RunXml,
}

#[derive(Debug, Deserialize)]
struct RunXml {
    #[serde(rename = "Instrument")]
    instrument: String,
    #[serde(rename = "Reads")]
    reads: ReadsXml,
}

#[derive(Debug, Deserialize)]
struct ReadsXml {
    #[serde(rename = "Read", default)]
    read: Vec<ReadXml>,
}

#[derive(Debug, Deserialize)]
struct ReadXml {
    #[serde(rename = "Number")]
    number: u32,
    #[serde(rename = "NumCycles")]
    num_cycles: u32,
    #[serde(rename = "IsIndexedRead")]
    is_indexed_read: String,
}

/// Read the run metadata of the runfolder at `runfolder`.
pub fn read(runfolder: &Path) -> DemuxResult<RunMetadata> {
    let path = runfolder.join(RUN_INFO_FILE);
    let content = std::fs::read_to_string(&path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            DemuxError::NotFound(format!("run metadata {}", path.display()))
        }
        _ => DemuxError::Io(format!("reading {}: {}", path.display(), e)),
    })?;
    parse(&content).map_err(|e| match e {
        DemuxError::Format(msg) => DemuxError::Format(format!("{}: {}", path.display(), msg)),
        other => other,
    })
}

/// Parse run metadata XML.
pub fn parse(content: &str) -> DemuxResult<RunMetadata> {
    let xml: RunInfoXml =
        serde_xml_rs::from_str(content).map_err(|e| DemuxError::Format(e.to_string()))?;

    let reads = xml
        .run
        .reads
        .read
        .into_iter()
        .map(|r| ReadDescriptor {
            number: r.number,
            cycles: r.num_cycles,
            is_index: r.is_indexed_read.trim().eq_ignore_ascii_case("Y"),
        })
        .collect();

    Ok(RunMetadata {
        instrument: xml.run.instrument.trim().to_string(),
        reads,
    })
}

/// Machine family for an instrument name, by longest matching prefix.
pub fn machine_family(instrument: &str) -> Option<&'static str> {
    longest_prefix_match(INSTRUMENT_PREFIXES, instrument)
}

fn longest_prefix_match(
    table: &[(&'static str, &'static str)],
    instrument: &str,
) -> Option<&'static str> {
    table
        .iter()
        .filter(|(prefix, _)| instrument.starts_with(prefix))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, family)| *family)
}

/// Resolve the tool version for a run from its instrument.
///
/// Fails with a lookup error when no prefix matches the instrument, or when
/// the matched machine family has no entry in `machine_types`.
pub fn derive_version(
    metadata: &RunMetadata,
    machine_types: &HashMap<String, MachineTypeConfig>,
) -> DemuxResult<String> {
    let family = machine_family(&metadata.instrument).ok_or_else(|| {
        DemuxError::Lookup(format!(
            "no machine type known for instrument {:?}",
            metadata.instrument
        ))
    })?;

    let entry = machine_types.get(family).ok_or_else(|| {
        DemuxError::Lookup(format!(
            "no tool version configured for machine type {:?} (instrument {:?})",
            family, metadata.instrument
        ))
    })?;

    tracing::debug!(
        instrument = %metadata.instrument,
        family,
        version = %entry.version,
        "resolved tool version"
    );
    Ok(entry.version.clone())
}
