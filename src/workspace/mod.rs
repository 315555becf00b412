//! Subject Workspace Module
//!
//! Prepares the isolated per-subject directory that a pipeline runs in.

pub mod stager;

pub use stager::{stage_subject, workspace_dir, StagedWorkspace, StagingError};
