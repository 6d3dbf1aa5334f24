//! Run metadata: instrument identity and the read layout of a sequencing run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One read (data or index) of a sequencing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadDescriptor {
    /// 1-based read number as reported by the instrument.
    pub number: u32,
    /// Number of cycles sequenced for this read.
    pub cycles: u32,
    pub is_index: bool,
}

/// Instrument and read layout of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Instrument name, e.g. `D00457` or `ST-E00215`.
    pub instrument: String,
    pub reads: Vec<ReadDescriptor>,
}

impl RunMetadata {
    /// Physical length of each index read, keyed by read number.
    pub fn index_lengths(&self) -> BTreeMap<u32, u32> {
        self.reads
            .iter()
            .filter(|r| r.is_index)
            .map(|r| (r.number, r.cycles))
            .collect()
    }

    /// True when the run has fewer than two data (non-index) reads.
    pub fn is_single_read(&self) -> bool {
        self.reads.iter().filter(|r| !r.is_index).count() < 2
    }
}
