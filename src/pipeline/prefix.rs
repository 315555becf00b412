//! Subject Identifier Extraction
//!
//! Derives the numeric subject prefix from a volume filename such as
//! `003-dwi.nii.gz`. The prefix is the leading run of one to six digits
//! and is what every step template gets parameterized with.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Anchored at the start so digits in the middle of a name never match.
static PREFIX_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,6}).*\.nii\.gz$").expect("prefix pattern is a valid regex")
});

/// Failure to derive a subject prefix from a filename.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrefixError {
    #[error("unable to extract identifier from '{0}': expected <digits>...nii.gz")]
    NoMatch(String),

    #[error("path has no usable file name: '{0}'")]
    NoFileName(String),
}

/// Extracts the subject prefix from a bare filename.
///
/// # Example
///
/// ```
/// use dwiprep::pipeline::prefix::extract_prefix;
///
/// assert_eq!(extract_prefix("003-dwi.nii.gz").unwrap(), "003");
/// assert!(extract_prefix("abc.nii.gz").is_err());
/// ```
pub fn extract_prefix(filename: &str) -> Result<String, PrefixError> {
    PREFIX_PATTERN
        .captures(filename)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| PrefixError::NoMatch(filename.to_string()))
}

/// Extracts the subject prefix from the file name component of a path.
pub fn prefix_for_path(path: &Path) -> Result<String, PrefixError> {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| PrefixError::NoFileName(path.display().to_string()))?;

    extract_prefix(filename)
}
