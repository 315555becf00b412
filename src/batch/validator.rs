//! Input Validation
//!
//! Checks user-supplied paths before anything is read or spawned. The
//! character filter is coarse: it only admits alphanumerics, hyphen, slash,
//! backslash, dot and underscore.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static ALLOWED_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9\-\\/._]+$").expect("allowed path pattern is a valid regex")
});

/// Validation error types for user-facing diagnostics.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("no input specified: pass --dirname or --filename")]
    NoInputSource,

    #[error("path contains characters outside [A-Za-z0-9-\\/._]: '{0}'")]
    InvalidCharacters(String),

    #[error("path does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("path is not a regular file: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("file cannot be read: {}: {source}", .path.display())]
    Unreadable { path: PathBuf, source: io::Error },

    #[error("directory contains no .nii.gz volumes: {}", .0.display())]
    NoVolumes(PathBuf),
}

/// Rejects paths containing characters outside the allowed set.
pub fn validate_path_chars(path: &Path) -> Result<(), ValidationError> {
    let text = path.to_string_lossy();
    if ALLOWED_PATH.is_match(&text) {
        Ok(())
    } else {
        Err(ValidationError::InvalidCharacters(text.into_owned()))
    }
}

/// Checks that `path` is an existing directory with acceptable characters.
pub fn validate_input_dir(path: &Path) -> Result<(), ValidationError> {
    validate_path_chars(path)?;

    if !path.exists() {
        return Err(ValidationError::NotFound(path.to_path_buf()));
    }
    if !path.is_dir() {
        return Err(ValidationError::NotADirectory(path.to_path_buf()));
    }
    Ok(())
}

/// Checks that `path` is an existing, readable regular file.
pub fn validate_input_file(path: &Path) -> Result<(), ValidationError> {
    validate_path_chars(path)?;

    if !path.exists() {
        return Err(ValidationError::NotFound(path.to_path_buf()));
    }
    if !path.is_file() {
        return Err(ValidationError::NotAFile(path.to_path_buf()));
    }

    File::open(path).map_err(|source| ValidationError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}
