//! Pure data types for demuxq: sample records, run metadata, job states.
//!
//! This crate is a leaf dependency with no async runtime and no I/O. It exists
//! so that orchestrators talking to a demuxq service can share its vocabulary
//! without pulling in the kernel's process and filesystem machinery.

pub mod job;
pub mod run;
pub mod sample;

// Flat re-exports for convenience
pub use job::*;
pub use run::*;
pub use sample::*;
