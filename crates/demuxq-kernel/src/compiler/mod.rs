//! Command compilers for the two tool generations.
//!
//! A [`Demultiplexer`] is selected once per request from the configured tool
//! version. The version's generation tag is resolved through a fixed registry,
//! and every configured tag is checked when the [`CompilerRegistry`] is built
//! so a bad mapping surfaces at startup rather than on the first request.
//!
//! # Architecture
//!
//! ```text
//! RunConfig ──► CompilerRegistry::create ──► Demultiplexer
//!                                              ├─ Strategy::Modern  (one invocation, per-lane masks)
//!                                              └─ Strategy::Legacy  (configure && make, one shared mask)
//! ```

mod legacy;
mod modern;

pub use legacy::LegacyCompiler;
pub use modern::ModernCompiler;

use std::collections::HashMap;

use crate::config::{ServiceConfig, VersionConfig};
use crate::error::{DemuxError, DemuxResult};
use crate::output::OutputArea;
use crate::run_config::RunConfig;

/// Tool generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Generation {
    /// Single-binary generation (2.x).
    Modern,
    /// Configure-then-make generation (1.x).
    Legacy,
}

/// Generation tags accepted in configuration.
const REGISTRY: &[(&str, Generation)] = &[
    ("bcl2fastq2x", Generation::Modern),
    ("bcl2fastq1x", Generation::Legacy),
];

impl Generation {
    /// Look up a generation tag in the registry.
    pub fn from_tag(tag: &str) -> DemuxResult<Generation> {
        REGISTRY
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, generation)| *generation)
            .ok_or_else(|| {
                let known: Vec<&str> = REGISTRY.iter().map(|(t, _)| *t).collect();
                DemuxError::Config(format!(
                    "unknown tool generation {:?} (known: {})",
                    tag,
                    known.join(", ")
                ))
            })
    }

    fn build(self, binary: &str, version: &str) -> Strategy {
        match self {
            Generation::Modern => Strategy::Modern(ModernCompiler::new(binary, version)),
            Generation::Legacy => Strategy::Legacy(LegacyCompiler::new(binary, version)),
        }
    }
}

/// The per-generation command construction.
#[derive(Debug, Clone)]
pub enum Strategy {
    Modern(ModernCompiler),
    Legacy(LegacyCompiler),
}

/// A compiler bound to one tool version, plus the output-area operations
/// that run before the compiled command.
#[derive(Debug, Clone)]
pub struct Demultiplexer {
    strategy: Strategy,
    output_area: OutputArea,
}

impl Demultiplexer {
    pub fn generation(&self) -> Generation {
        match &self.strategy {
            Strategy::Modern(_) => Generation::Modern,
            Strategy::Legacy(_) => Generation::Legacy,
        }
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    /// Version of the tool that will run.
    ///
    /// The modern generation asks the installed binary and falls back to the
    /// configured version; the legacy generation has no way to ask.
    pub async fn version(&self) -> String {
        match &self.strategy {
            Strategy::Modern(c) => c.version().await,
            Strategy::Legacy(c) => c.version().to_string(),
        }
    }

    /// Compile the full command line for `config`. Nothing is executed.
    pub fn construct_command(&self, config: &RunConfig) -> DemuxResult<String> {
        let command = match &self.strategy {
            Strategy::Modern(c) => c.construct_command(config)?,
            Strategy::Legacy(c) => c.construct_command(config)?,
        };
        tracing::debug!("Generated command: {}", command);
        Ok(command)
    }

    /// Validate and remove the output directory of `config`.
    pub async fn delete_output(&self, config: &RunConfig) -> DemuxResult<()> {
        self.output_area.delete_output(&config.output).await
    }

    /// Point `<runfolder>/Unaligned` at the output directory of `config`.
    pub async fn symlink_output(&self, config: &RunConfig) -> DemuxResult<()> {
        self.output_area
            .link_unaligned(&config.runfolder, &config.output)
            .await
    }
}

/// Configured tool versions resolved to their compilers.
#[derive(Debug, Clone)]
pub struct CompilerRegistry {
    versions: HashMap<String, (Generation, String)>,
    output_area: OutputArea,
}

impl CompilerRegistry {
    /// Resolve every configured version. Fails on the first unknown
    /// generation tag.
    pub fn new(settings: &ServiceConfig) -> DemuxResult<Self> {
        let versions = settings
            .versions
            .iter()
            .map(|(version, VersionConfig { generation, binary })| {
                Generation::from_tag(generation)
                    .map(|g| (version.clone(), (g, binary.clone())))
                    .map_err(|e| {
                        DemuxError::Config(format!("version {:?}: {}", version, e.message()))
                    })
            })
            .collect::<DemuxResult<HashMap<_, _>>>()?;

        Ok(Self {
            versions,
            output_area: OutputArea::new(settings.allowed_output_folders.clone()),
        })
    }

    /// Compiler for the tool version named in `config`.
    pub fn create(&self, config: &RunConfig) -> DemuxResult<Demultiplexer> {
        let (generation, binary) = self.versions.get(&config.tool_version).ok_or_else(|| {
            DemuxError::Lookup(format!(
                "no configured tool for version {:?}",
                config.tool_version
            ))
        })?;

        Ok(Demultiplexer {
            strategy: generation.build(binary, &config.tool_version),
            output_area: self.output_area.clone(),
        })
    }

    pub fn output_area(&self) -> &OutputArea {
        &self.output_area
    }
}

/// Append `flag value` when `value` is set.
pub(crate) fn push_optional(parts: &mut Vec<String>, flag: &str, value: Option<impl std::fmt::Display>) {
    if let Some(value) = value {
        parts.push(format!("{} {}", flag, value));
    }
}
