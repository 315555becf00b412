//! dwiprep - Diffusion MRI Preprocessing Batch Driver
//!
//! Sequences the external MRtrix3 tools that preprocess diffusion-weighted
//! MRI volumes. For every subject volume it derives a numeric prefix from the
//! filename, expands a fixed seven-step command table with it, stages the
//! subject's files into an isolated workspace, and runs the commands in
//! order, stopping that subject at the first failure.
//!
//! # Architecture
//!
//! - [`pipeline`]: Prefix extraction, the step table, and command expansion
//! - [`workspace`]: Per-subject workspace staging
//! - [`execution`]: The sequential, fail-fast execution loop
//! - [`batch`]: Input discovery, per-subject orchestration, and reporting
//! - [`monitoring`]: Step timing
//!
//! # Example
//!
//! ```rust,no_run
//! use dwiprep::batch::{BatchConfig, BatchDriver, InputSource};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = BatchConfig::new(InputSource::Directory("/data/scans".into()));
//!     config.output_root = Some("/data/out".into());
//!
//!     let report = BatchDriver::new(config).run()?;
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod execution;
pub mod monitoring;
pub mod pipeline;
pub mod workspace;

// Re-export commonly used types
pub use batch::{BatchConfig, BatchDriver, BatchReport, InputSource};
pub use execution::{Engine, SubjectRun};
pub use pipeline::{expand_pipeline, extract_prefix, ExpandedCommand, StepTemplate, PIPELINE};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "dwiprep";
