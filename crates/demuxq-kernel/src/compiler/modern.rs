//! Single-invocation generation (2.x).

use std::process::Stdio;

use tokio::process::Command;

use super::push_optional;
use crate::basemask::LaneMasks;
use crate::error::DemuxResult;
use crate::run_config::RunConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModernCompiler {
    binary: String,
    configured_version: String,
}

impl ModernCompiler {
    pub fn new(binary: impl Into<String>, configured_version: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            configured_version: configured_version.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Ask the binary for its version. The second line of the combined
    /// output carries it; anything else falls back to the configured value.
    pub async fn version(&self) -> String {
        let output = Command::new(&self.binary)
            .args(["--version", "--min-log-level=NONE"])
            .stdin(Stdio::null())
            .output()
            .await;

        match output {
            Ok(out) if out.status.success() => {
                let mut text = String::from_utf8_lossy(&out.stdout).into_owned();
                text.push_str(&String::from_utf8_lossy(&out.stderr));
                match parse_version_output(&text) {
                    Some(version) => version,
                    None => {
                        tracing::debug!(
                            "Unexpected version output from {}, using configured version",
                            self.binary
                        );
                        self.configured_version.clone()
                    }
                }
            }
            Ok(out) => {
                tracing::debug!(
                    "{} --version exited with {}, using configured version",
                    self.binary,
                    out.status
                );
                self.configured_version.clone()
            }
            Err(e) => {
                tracing::debug!(
                    "Could not run {}: {}, using configured version",
                    self.binary,
                    e
                );
                self.configured_version.clone()
            }
        }
    }

    pub fn construct_command(&self, config: &RunConfig) -> DemuxResult<String> {
        let masks = match config.base_mask {
            Some(_) => None,
            None => Some(config.lane_masks()?),
        };
        Ok(self.assemble(config, masks.as_ref()))
    }

    fn assemble(&self, config: &RunConfig, masks: Option<&LaneMasks>) -> String {
        let mut parts = vec![
            self.binary.clone(),
            format!("--input-dir {}", config.base_calls.display()),
            format!("--output-dir {}", config.output.display()),
            format!("--sample-sheet {}", config.sample_sheet.display()),
        ];
        push_optional(&mut parts, "--barcode-mismatches", config.barcode_mismatches);
        push_optional(&mut parts, "--tiles", config.tiles.as_deref());
        if config.create_index_fastqs {
            parts.push("--create-fastq-for-index-reads".to_string());
        }

        match (&config.base_mask, masks) {
            (Some(mask), _) => parts.push(mask.clone()),
            (None, Some(masks)) => {
                parts.extend(
                    masks
                        .iter()
                        .map(|(lane, mask)| format!("--use-bases-mask {}:{}", lane, mask)),
                );
            }
            (None, None) => {}
        }

        if let Some(extra) = &config.extra_args {
            parts.push(extra.clone());
        }
        parts.join(" ")
    }
}

fn parse_version_output(text: &str) -> Option<String> {
    text.lines()
        .nth(1)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
}
