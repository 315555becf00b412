//! Pipeline Definition Module
//!
//! Everything needed to turn an input volume into an ordered list of
//! concrete tool invocations, without touching the filesystem.
//!
//! # Structure
//!
//! - [`prefix`]: Subject prefix extraction from filenames
//! - [`template`]: The fixed, ordered step template table
//! - [`expand`]: Substitution of a prefix into the table

pub mod expand;
pub mod prefix;
pub mod template;

pub use expand::{expand_pipeline, pipeline_inputs, ExpandedCommand};
pub use prefix::{extract_prefix, prefix_for_path, PrefixError};
pub use template::{StepTemplate, PIPELINE};
