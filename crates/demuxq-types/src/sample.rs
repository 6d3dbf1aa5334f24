//! Sample records as described by the `[Data]` section of a sample sheet.

use serde::{Deserialize, Serialize};

/// One row of a sample sheet.
///
/// Optional fields distinguish "column not present in the sheet" (`None`)
/// from "column present but cell empty" (`Some("")`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRecord {
    /// Lane the sample was sequenced on. Sheets without a lane column use 1.
    pub lane: u32,
    pub sample_id: String,
    pub sample_name: String,
    /// First index sequence. Empty when the sample is not indexed.
    pub index1: String,
    /// Second index sequence for dual-indexed runs.
    pub index2: Option<String>,
    pub project: String,
    pub plate: Option<String>,
    pub well: Option<String>,
    /// Free-text field, often used for library metadata.
    pub description: Option<String>,
}

impl SampleRecord {
    /// Create a record on lane 1 with all optional columns absent.
    pub fn new(
        sample_id: impl Into<String>,
        sample_name: impl Into<String>,
        index1: impl Into<String>,
        project: impl Into<String>,
    ) -> Self {
        Self {
            lane: 1,
            sample_id: sample_id.into(),
            sample_name: sample_name.into(),
            index1: index1.into(),
            index2: None,
            project: project.into(),
            plate: None,
            well: None,
            description: None,
        }
    }

    pub fn with_lane(mut self, lane: u32) -> Self {
        self.lane = lane;
        self
    }

    pub fn with_index2(mut self, index2: impl Into<String>) -> Self {
        self.index2 = Some(index2.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Lengths of the sample's index sequences, with surrounding whitespace
    /// ignored. The second entry is 0 when there is no second index.
    pub fn index_lengths(&self) -> [usize; 2] {
        [
            self.index1.trim().len(),
            self.index2.as_deref().map(|s| s.trim().len()).unwrap_or(0),
        ]
    }
}
