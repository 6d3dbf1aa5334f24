//! Configure-then-make generation (1.x).

use std::collections::BTreeSet;

use super::push_optional;
use crate::basemask::LaneMasks;
use crate::error::{DemuxError, DemuxResult};
use crate::run_config::RunConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyCompiler {
    binary: String,
    version: String,
}

impl LegacyCompiler {
    pub fn new(binary: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            version: version.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn construct_command(&self, config: &RunConfig) -> DemuxResult<String> {
        let mut parts = vec![
            self.binary.clone(),
            format!("--input-dir {}", config.base_calls.display()),
            format!("--sample-sheet {}", config.sample_sheet.display()),
            format!("--output-dir {}", config.output.display()),
            "--fastq-cluster-count 0".to_string(),
            "--force".to_string(),
        ];
        push_optional(&mut parts, "--mismatches", config.barcode_mismatches);
        push_optional(&mut parts, "--tiles", config.tiles.as_deref());

        let mask = match &config.base_mask {
            Some(mask) => mask.clone(),
            None => shared_mask(&config.lane_masks()?)?,
        };
        parts.push(format!("--use_bases_mask {}", mask));

        if let Some(extra) = &config.extra_args {
            parts.push(extra.clone());
        }

        Ok(format!("{} && make -j{}", parts.join(" "), config.core_count))
    }
}

/// The one mask every lane agrees on.
fn shared_mask(masks: &LaneMasks) -> DemuxResult<String> {
    let distinct: BTreeSet<String> = masks.values().map(ToString::to_string).collect();
    let mut iter = distinct.into_iter();
    match (iter.next(), iter.next()) {
        (Some(mask), None) => Ok(mask),
        (None, _) => Err(DemuxError::Config(
            "sample sheet has no lanes to derive a base mask from".to_string(),
        )),
        (Some(_), Some(_)) => {
            let lanes: Vec<String> = masks
                .iter()
                .map(|(lane, mask)| format!("{}:{}", lane, mask))
                .collect();
            Err(DemuxError::Config(format!(
                "legacy generation cannot mix per-lane base masks ({})",
                lanes.join(" ")
            )))
        }
    }
}
