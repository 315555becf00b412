//! Pipeline Execution Module
//!
//! Runs a subject's expanded commands sequentially with fail-fast
//! semantics, either for real or as a dry run.
//!
//! # Architecture
//!
//! - [`engine`]: The per-subject execution loop
//! - [`step`]: Spawning and classifying a single step

pub mod engine;
pub mod step;

pub use engine::{Engine, RunStatus, SubjectRun};
pub use step::{ProcessRunner, StepError, StepOutput, StepRunner};
