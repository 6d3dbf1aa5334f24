//! Base-mask derivation.
//!
//! A base mask tells the demultiplexing tool how to treat every sequencing
//! cycle: as data (`y*`), as index (`i<N>`), or ignored (`n*`). Tokens for one
//! read are concatenated, reads are joined with `,`.
//!
//! Masks are derived per lane from the index lengths in the sample sheet and
//! the physical length of each index read. Every sample in a lane is assumed
//! to share the same index geometry, so the first sample of each lane speaks
//! for the lane.

use std::collections::BTreeMap;

use demuxq_types::SampleRecord;

use crate::error::{DemuxError, DemuxResult};

/// One token of a base mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaskToken {
    /// `y*`: every cycle of the read is data.
    Data,
    /// `i<N>`: N cycles are index.
    Index(u32),
    /// `n*`: every remaining cycle is ignored.
    IgnoreRest,
}

impl std::fmt::Display for MaskToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MaskToken::Data => write!(f, "y*"),
            MaskToken::Index(n) => write!(f, "i{}", n),
            MaskToken::IgnoreRest => write!(f, "n*"),
        }
    }
}

/// The tokens covering one read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReadMask(Vec<MaskToken>);

impl ReadMask {
    pub fn data() -> Self {
        ReadMask(vec![MaskToken::Data])
    }

    pub fn tokens(&self) -> &[MaskToken] {
        &self.0
    }

    /// Number of cycles used as index in this read.
    pub fn index_cycles(&self) -> u32 {
        self.0
            .iter()
            .map(|t| match t {
                MaskToken::Index(n) => *n,
                _ => 0,
            })
            .sum()
    }
}

impl std::fmt::Display for ReadMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for token in &self.0 {
            write!(f, "{}", token)?;
        }
        Ok(())
    }
}

/// Mask for one lane: the leading data read, one segment per index read,
/// and a trailing data read unless the run is single-read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BaseMask {
    reads: Vec<ReadMask>,
    index_reads: usize,
}

impl BaseMask {
    pub fn reads(&self) -> &[ReadMask] {
        &self.reads
    }

    /// Number of index segments, equal to the number of index reads.
    pub fn index_segments(&self) -> usize {
        self.index_reads
    }
}

impl std::fmt::Display for BaseMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, read) in self.reads.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", read)?;
        }
        Ok(())
    }
}

/// Base masks keyed by lane, in lane order.
pub type LaneMasks = BTreeMap<u32, BaseMask>;

/// Segment for one index read.
///
/// `sheet_len` is the index length given in the sample sheet, `read_len` the
/// number of cycles the instrument actually read.
pub fn build_index_segment(sheet_len: u32, read_len: u32) -> DemuxResult<ReadMask> {
    if sheet_len > read_len {
        return Err(DemuxError::Config(format!(
            "sample sheet index ({} bases) is longer than physically read ({} cycles)",
            sheet_len, read_len
        )));
    }

    let tokens = if sheet_len == 0 {
        vec![MaskToken::IgnoreRest]
    } else if sheet_len < read_len {
        vec![MaskToken::Index(sheet_len), MaskToken::IgnoreRest]
    } else {
        vec![MaskToken::Index(sheet_len)]
    };
    Ok(ReadMask(tokens))
}

/// Derive the base mask of every lane in `records`.
///
/// `index_lengths` maps index read numbers to their physical cycle counts.
/// A lane whose samples carry fewer index sequences than there are index
/// reads still gets a fully ignored segment for each missing index.
pub fn compute_base_masks(
    records: &[SampleRecord],
    index_lengths: &BTreeMap<u32, u32>,
    is_single_read: bool,
) -> DemuxResult<LaneMasks> {
    let mut representatives: BTreeMap<u32, &SampleRecord> = BTreeMap::new();
    for record in records {
        representatives.entry(record.lane).or_insert(record);
    }

    let mut masks = LaneMasks::new();
    for (lane, record) in representatives {
        let sheet_lengths = record.index_lengths();

        let mut reads = vec![ReadMask::data()];
        for (i, (read_number, read_len)) in index_lengths.iter().enumerate() {
            let sheet_len = sheet_lengths.get(i).copied().unwrap_or(0) as u32;
            let segment = build_index_segment(sheet_len, *read_len).map_err(|e| {
                DemuxError::Config(format!("lane {}, read {}: {}", lane, read_number, e.message()))
            })?;
            reads.push(segment);
        }
        if !is_single_read {
            reads.push(ReadMask::data());
        }

        masks.insert(
            lane,
            BaseMask {
                reads,
                index_reads: index_lengths.len(),
            },
        );
    }
    Ok(masks)
}
