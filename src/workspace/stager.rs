//! Per-subject Workspace Staging
//!
//! Creates `output_root/<prefix>/` and copies every regular file from the
//! input directory that belongs to the subject into it: names starting with
//! the subject prefix (not followed by another digit, so subject `1` never
//! picks up `10.bvec`), plus any file the pipeline names as an input (the
//! `AP<prefix>`/`PA<prefix>` phase-encode pair does not start with it). The
//! staged directory is returned to the caller, which passes it to each
//! spawned process. The process-wide current directory is never touched.
//!
//! When the workspace resolves to the input directory itself the files are
//! already in place and nothing is copied; copying a file onto itself would
//! truncate it.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use thiserror::Error;

/// Failure while preparing a subject workspace.
#[derive(Debug, Error)]
pub enum StagingError {
    #[error("failed to create workspace {}: {source}", .path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to read input directory {}: {source}", .path.display())]
    ReadDir { path: PathBuf, source: io::Error },

    #[error("failed to copy {} to {}: {source}", .from.display(), .to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
}

/// Result of staging one subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedWorkspace {
    /// Directory the subject's commands run in
    pub dir: PathBuf,
    /// Names of the files copied in, sorted
    pub files: Vec<String>,
}

/// Returns `output_root/<prefix>`.
pub fn workspace_dir(output_root: &Path, prefix: &str) -> PathBuf {
    output_root.join(prefix)
}

/// True when `name` starts with `prefix` and the prefix is not the start of
/// a longer number.
pub fn belongs_to_subject(name: &str, prefix: &str) -> bool {
    name.strip_prefix(prefix)
        .map_or(false, |rest| !rest.starts_with(|c: char| c.is_ascii_digit()))
}

/// Lists regular files in `input_dir` that belong to `prefix` or appear in
/// `required`, sorted.
pub fn matching_files(
    input_dir: &Path,
    prefix: &str,
    required: &[String],
) -> Result<Vec<String>, StagingError> {
    let entries = fs::read_dir(input_dir).map_err(|source| StagingError::ReadDir {
        path: input_dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| StagingError::ReadDir {
            path: input_dir.to_path_buf(),
            source,
        })?;

        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if !is_file {
            continue;
        }

        match entry.file_name().into_string() {
            Ok(name) if belongs_to_subject(&name, prefix) || required.contains(&name) => {
                files.push(name)
            }
            Ok(_) => {}
            Err(name) => debug!("Skipping non UTF-8 file name: {:?}", name),
        }
    }

    files.sort();
    Ok(files)
}

/// Stages a subject's files into its workspace directory.
///
/// `required` holds exact file names the pipeline reads regardless of prefix.
/// The directory is created if absent. Existing files with the same name are
/// overwritten. Permissions and modification times are carried over.
/// A file is never copied onto itself.
pub fn stage_subject(
    input_dir: &Path,
    prefix: &str,
    required: &[String],
    output_root: &Path,
) -> Result<StagedWorkspace, StagingError> {
    let dir = workspace_dir(output_root, prefix);

    if !dir.exists() {
        fs::create_dir_all(&dir).map_err(|source| StagingError::CreateDir {
            path: dir.clone(),
            source,
        })?;
        debug!("Created workspace: {}", dir.display());
    }

    let files = matching_files(input_dir, prefix, required)?;

    if same_location(input_dir, &dir) {
        info!(
            "Workspace {} is the input directory; using {} file(s) in place",
            dir.display(),
            files.len()
        );
        return Ok(StagedWorkspace { dir, files });
    }

    if files.is_empty() {
        warn!(
            "No files starting with '{}' found in {}",
            prefix,
            input_dir.display()
        );
    }

    for name in &files {
        let from = input_dir.join(name);
        let to = dir.join(name);
        if same_location(&from, &to) {
            debug!("{} is already in the workspace", name);
            continue;
        }
        copy_preserving_mtime(&from, &to).map_err(|source| StagingError::Copy {
            from: from.clone(),
            to: to.clone(),
            source,
        })?;
        debug!("Staged {}", name);
    }

    info!(
        "Staged {} file(s) for subject {} into {}",
        files.len(),
        prefix,
        dir.display()
    );

    Ok(StagedWorkspace { dir, files })
}

/// True when both paths exist and resolve to the same location.
fn same_location(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Copies a file (contents and permissions), then restores its modification time.
fn copy_preserving_mtime(from: &Path, to: &Path) -> io::Result<()> {
    fs::copy(from, to)?;

    let modified = fs::metadata(from)?.modified()?;
    let dest = OpenOptions::new().write(true).open(to)?;
    if let Err(e) = dest.set_modified(modified) {
        debug!("Could not preserve mtime on {}: {}", to.display(), e);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), name).unwrap();
    }

    fn phase_pair(prefix: &str) -> Vec<String> {
        vec![format!("AP{}.nii.gz", prefix), format!("PA{}.nii.gz", prefix)]
    }

    fn subject_fixture(dir: &Path) {
        for name in [
            "003.bvec",
            "003.bval",
            "003-dwi.nii.gz",
            "AP003.nii.gz",
            "PA003.nii.gz",
            "004.bvec",
        ] {
            touch(dir, name);
        }
    }

    #[test]
    fn test_workspace_dir() {
        assert_eq!(
            workspace_dir(Path::new("/data/out"), "003"),
            PathBuf::from("/data/out/003")
        );
    }

    #[test]
    fn test_matching_files_filters_by_prefix() {
        let input = tempdir().unwrap();
        subject_fixture(input.path());

        let files = matching_files(input.path(), "003", &[]).unwrap();
        assert_eq!(files, vec!["003-dwi.nii.gz", "003.bval", "003.bvec"]);
    }

    #[test]
    fn test_matching_files_includes_required_names() {
        let input = tempdir().unwrap();
        subject_fixture(input.path());
        touch(input.path(), "AP004.nii.gz");

        let files = matching_files(input.path(), "003", &phase_pair("003")).unwrap();
        assert_eq!(
            files,
            vec!["003-dwi.nii.gz", "003.bval", "003.bvec", "AP003.nii.gz", "PA003.nii.gz"]
        );
    }

    #[test]
    fn test_matching_files_skips_directories() {
        let input = tempdir().unwrap();
        touch(input.path(), "003.bvec");
        fs::create_dir(input.path().join("003-extra")).unwrap();

        let files = matching_files(input.path(), "003", &[]).unwrap();
        assert_eq!(files, vec!["003.bvec"]);
    }

    #[test]
    fn test_stage_subject_copies_only_prefixed_files() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        subject_fixture(input.path());

        let staged = stage_subject(input.path(), "003", &phase_pair("003"), output.path()).unwrap();

        assert_eq!(staged.dir, output.path().join("003"));
        assert!(staged.dir.join("003.bvec").exists());
        assert!(staged.dir.join("003.bval").exists());
        assert!(staged.dir.join("003-dwi.nii.gz").exists());
        assert!(staged.dir.join("AP003.nii.gz").exists());
        assert!(staged.dir.join("PA003.nii.gz").exists());
        assert!(!staged.dir.join("004.bvec").exists());
        assert_eq!(staged.files.len(), 5);
    }

    #[test]
    fn test_stage_subject_preserves_contents() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        fs::write(input.path().join("007.bval"), "0 1000 1000").unwrap();

        let staged = stage_subject(input.path(), "007", &[], output.path()).unwrap();
        let copied = fs::read_to_string(staged.dir.join("007.bval")).unwrap();
        assert_eq!(copied, "0 1000 1000");
    }

    #[test]
    fn test_stage_subject_preserves_mtime() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        touch(input.path(), "008.bvec");

        let staged = stage_subject(input.path(), "008", &[], output.path()).unwrap();

        let original = fs::metadata(input.path().join("008.bvec")).unwrap().modified().unwrap();
        let copied = fs::metadata(staged.dir.join("008.bvec")).unwrap().modified().unwrap();
        assert_eq!(original, copied);
    }

    #[test]
    fn test_stage_subject_existing_workspace() {
        let input = tempdir().unwrap();
        let output = tempdir().unwrap();
        touch(input.path(), "003.bvec");
        fs::create_dir_all(output.path().join("003")).unwrap();

        let staged = stage_subject(input.path(), "003", &[], output.path()).unwrap();
        assert!(staged.dir.join("003.bvec").exists());
    }

    #[test]
    fn test_belongs_to_subject() {
        assert!(belongs_to_subject("1.bvec", "1"));
        assert!(belongs_to_subject("1-dwi.nii.gz", "1"));
        assert!(!belongs_to_subject("10.bvec", "1"));
        assert!(!belongs_to_subject("100-dwi.nii.gz", "1"));
        assert!(!belongs_to_subject("AP1.nii.gz", "1"));
    }

    #[test]
    fn test_matching_files_ignores_longer_prefixes() {
        let input = tempdir().unwrap();
        for name in ["1.bvec", "1-dwi.nii.gz", "10.bvec", "100-dwi.nii.gz"] {
            touch(input.path(), name);
        }

        let files = matching_files(input.path(), "1", &[]).unwrap();
        assert_eq!(files, vec!["1-dwi.nii.gz", "1.bvec"]);
    }

    #[test]
    fn test_stage_subject_into_own_directory_keeps_inputs() {
        let root = tempdir().unwrap();
        let subject_dir = root.path().join("003");
        fs::create_dir(&subject_dir).unwrap();
        fs::write(subject_dir.join("003-dwi.nii.gz"), "raw volume bytes").unwrap();
        fs::write(subject_dir.join("003.bval"), "0 1000").unwrap();

        let staged = stage_subject(&subject_dir, "003", &[], root.path()).unwrap();

        assert_eq!(staged.dir, subject_dir);
        assert_eq!(staged.files, vec!["003-dwi.nii.gz", "003.bval"]);
        assert_eq!(
            fs::read_to_string(subject_dir.join("003-dwi.nii.gz")).unwrap(),
            "raw volume bytes"
        );
        assert_eq!(fs::read_to_string(subject_dir.join("003.bval")).unwrap(), "0 1000");
    }

    #[cfg(unix)]
    #[test]
    fn test_stage_subject_through_symlinked_root_keeps_inputs() {
        let root = tempdir().unwrap();
        let subject_dir = root.path().join("003");
        fs::create_dir(&subject_dir).unwrap();
        fs::write(subject_dir.join("003-dwi.nii.gz"), "raw volume bytes").unwrap();

        let alias = root.path().join("alias");
        std::os::unix::fs::symlink(root.path(), &alias).unwrap();

        stage_subject(&subject_dir, "003", &[], &alias).unwrap();
        assert_eq!(
            fs::read_to_string(subject_dir.join("003-dwi.nii.gz")).unwrap(),
            "raw volume bytes"
        );
    }

    #[test]
    fn test_stage_subject_missing_input_dir() {
        let output = tempdir().unwrap();
        let missing = output.path().join("does-not-exist");

        let result = stage_subject(&missing, "003", &[], output.path());
        assert!(matches!(result, Err(StagingError::ReadDir { .. })));
    }
}
