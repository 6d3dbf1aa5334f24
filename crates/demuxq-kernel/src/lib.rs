//! demuxq-kernel: the core of demuxq.
//!
//! Turns a demultiplexing request for a sequencing runfolder into the exact
//! command line of the installed demultiplexing tool, then hands that command
//! to a job backend and tracks it.
//!
//! This crate provides:
//!
//! - **Sample sheets**: parsing the `[Data]` section into [`SampleRecord`]s
//! - **Run metadata**: reading `RunInfo.xml` and mapping instruments to tool versions
//! - **Base masks**: per-lane masks derived from index lengths
//! - **Configuration**: service settings and per-request run configuration
//! - **Compilers**: command construction for the modern and legacy tool generations
//! - **Output area**: allow-list validation, cleanup and the `Unaligned` link
//! - **Jobs**: the backend contract, a local queue backend, and the lifecycle adapter
//! - **Service**: [`DemuxService`], which wires everything together
//!
//! [`SampleRecord`]: demuxq_types::SampleRecord

pub mod basemask;
pub mod compiler;
pub mod config;
pub mod error;
pub mod jobs;
pub mod logs;
pub mod output;
pub mod run_config;
pub mod runinfo;
pub mod samplesheet;
pub mod service;

#[cfg(test)]
pub(crate) mod testutil;

pub use basemask::{compute_base_masks, BaseMask, LaneMasks};
pub use compiler::{CompilerRegistry, Demultiplexer, Generation};
pub use config::{MachineTypeConfig, ServiceConfig, VersionConfig};
pub use error::{DemuxError, DemuxResult, Stage};
pub use jobs::{JobBackend, JobLifecycleAdapter, JobSpec, LocalQueue};
pub use logs::LogFileProvider;
pub use output::OutputArea;
pub use run_config::{RunConfig, RunRequest};
pub use service::{CompiledRun, DemuxService, StartedJob};
