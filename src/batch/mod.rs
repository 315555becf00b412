//! Batch Processing Module
//!
//! Drives subject runs over a directory of volumes or a single volume.
//!
//! # Structure
//!
//! - [`driver`]: Input discovery and per-subject orchestration
//! - [`validator`]: Path and input source validation
//! - [`report`]: Per-subject outcomes and the batch report

pub mod driver;
pub mod report;
pub mod validator;

pub use driver::{BatchConfig, BatchDriver, BatchError, InputSource};
pub use report::{BatchReport, OutcomeStatus, SubjectOutcome};
pub use validator::ValidationError;
