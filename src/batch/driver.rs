//! Batch Driver
//!
//! Turns an input source (a directory of volumes or a single volume) into
//! one subject run per volume: extract the prefix, stage the workspace,
//! execute. Subjects are processed one after another; a failing subject
//! never stops the ones after it.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, error, info, warn};
use thiserror::Error;

use crate::execution::{Engine, ProcessRunner, RunStatus, StepRunner, SubjectRun};
use crate::pipeline::{pipeline_inputs, prefix_for_path, PrefixError};
use crate::workspace::{stage_subject, workspace_dir, StagingError};

use super::report::{BatchReport, OutcomeStatus, SubjectOutcome};
use super::validator::{validate_input_dir, validate_input_file, validate_path_chars, ValidationError};

/// Suffix of the compressed volumes picked up from an input directory.
pub const VOLUME_SUFFIX: &str = ".nii.gz";

/// Name of the default output directory, created next to the input directory.
pub const DEFAULT_OUTPUT_DIR: &str = "out";

/// Errors that stop the whole batch before or instead of per-subject work.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to read input directory {}: {source}", .path.display())]
    ReadDir { path: PathBuf, source: io::Error },

    #[error("failed to create output directory {}: {source}", .path.display())]
    CreateOutput { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Prefix(#[from] PrefixError),
}

/// Why a single subject could not be started.
#[derive(Debug, Error)]
enum SubjectError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Prefix(#[from] PrefixError),

    #[error(transparent)]
    Staging(#[from] StagingError),
}

/// Where the volumes to process come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    Directory(PathBuf),
    File(PathBuf),
}

impl InputSource {
    /// Picks the input source from the two CLI options.
    ///
    /// The directory wins when both are given.
    pub fn from_options(
        dirname: Option<PathBuf>,
        filename: Option<PathBuf>,
    ) -> Result<Self, ValidationError> {
        match (dirname, filename) {
            (Some(dir), file) => {
                if let Some(file) = file {
                    warn!(
                        "Both a directory and a file were given; ignoring {}",
                        file.display()
                    );
                }
                Ok(Self::Directory(dir))
            }
            (None, Some(file)) => Ok(Self::File(file)),
            (None, None) => Err(ValidationError::NoInputSource),
        }
    }

    /// The directory the input volume(s) live in.
    pub fn input_dir(&self) -> PathBuf {
        match self {
            Self::Directory(dir) => dir.clone(),
            Self::File(file) => parent_or_current(file),
        }
    }
}

/// Settings for one batch invocation.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub source: InputSource,
    /// Root for per-subject workspaces; derived from the source when unset
    pub output_root: Option<PathBuf>,
    pub dry_run: bool,
    pub step_timeout: Option<Duration>,
}

impl BatchConfig {
    pub fn new(source: InputSource) -> Self {
        Self {
            source,
            output_root: None,
            dry_run: false,
            step_timeout: None,
        }
    }

    /// The configured output root, or the default derived from the source.
    pub fn resolved_output_root(&self) -> PathBuf {
        self.output_root
            .clone()
            .unwrap_or_else(|| default_output_root(&self.source.input_dir()))
    }
}

/// Returns the sibling `out` directory of `input_dir`.
///
/// Falls back to `out` in the current directory when `input_dir` has no parent.
pub fn default_output_root(input_dir: &Path) -> PathBuf {
    match input_dir.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(DEFAULT_OUTPUT_DIR),
        _ => PathBuf::from(DEFAULT_OUTPUT_DIR),
    }
}

fn parent_or_current(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Lists the regular files directly inside `dir` that end in `.nii.gz`, sorted.
pub fn discover_volumes(dir: &Path) -> Result<Vec<PathBuf>, BatchError> {
    let read_error = |source: io::Error| BatchError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut volumes = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_error)? {
        let entry = entry.map_err(read_error)?;
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        let name = entry.file_name();

        if is_file && name.to_string_lossy().ends_with(VOLUME_SUFFIX) {
            volumes.push(entry.path());
        }
    }

    volumes.sort();
    Ok(volumes)
}

/// Splits discovered volumes into subject volumes and companion inputs.
///
/// A companion is a volume without a subject prefix of its own that the
/// pipeline of another discovered subject reads, such as `AP003.nii.gz`
/// next to `003-dwi.nii.gz`. Returns `(subjects, companions)`.
pub fn partition_companions(volumes: Vec<PathBuf>) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let required: HashSet<String> = volumes
        .iter()
        .filter_map(|volume| prefix_for_path(volume).ok())
        .flat_map(|prefix| pipeline_inputs(&prefix))
        .collect();

    volumes.into_iter().partition(|volume| {
        let is_companion = prefix_for_path(volume).is_err()
            && volume
                .file_name()
                .and_then(|name| name.to_str())
                .map_or(false, |name| required.contains(name));
        !is_companion
    })
}

/// Runs subjects for an input source.
///
/// # Example
///
/// ```rust,no_run
/// use dwiprep::batch::{BatchConfig, BatchDriver, InputSource};
///
/// let mut config = BatchConfig::new(InputSource::Directory("/data/scans".into()));
/// config.dry_run = true;
///
/// let report = BatchDriver::new(config).run()?;
/// println!("{}", report.summary());
/// # Ok::<(), dwiprep::batch::BatchError>(())
/// ```
pub struct BatchDriver<R: StepRunner = ProcessRunner> {
    config: BatchConfig,
    engine: Engine<R>,
}

impl BatchDriver<ProcessRunner> {
    /// Creates a driver that spawns real processes.
    pub fn new(config: BatchConfig) -> Self {
        let runner = match config.step_timeout {
            Some(timeout) => ProcessRunner::new().with_timeout(timeout),
            None => ProcessRunner::new(),
        };
        if let Some(timeout) = runner.timeout() {
            info!("Per-step timeout: {:?}", timeout);
        }
        Self::with_runner(config, runner)
    }
}

impl<R: StepRunner> BatchDriver<R> {
    /// Creates a driver around a custom step runner.
    pub fn with_runner(config: BatchConfig, runner: R) -> Self {
        let mut engine = Engine::with_runner(runner);
        engine.set_dry_run(config.dry_run);
        Self { config, engine }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn engine(&self) -> &Engine<R> {
        &self.engine
    }

    /// Processes every subject of the configured source.
    ///
    /// # Returns
    ///
    /// * `Ok(report)` - All subjects were attempted; see the report for failures
    /// * `Err` - The source itself is invalid, or the single input file has
    ///   no extractable prefix
    pub fn run(&self) -> Result<BatchReport, BatchError> {
        let output_root = self.config.resolved_output_root();
        validate_path_chars(&output_root)?;

        let volumes = match &self.config.source {
            InputSource::Directory(dir) => {
                validate_input_dir(dir)?;
                let (subjects, companions) = partition_companions(discover_volumes(dir)?);
                if subjects.is_empty() {
                    return Err(ValidationError::NoVolumes(dir.clone()).into());
                }
                for companion in &companions {
                    debug!("{} is a pipeline input, not a subject", companion.display());
                }
                info!(
                    "Loop through directory: {} ({} subject volume(s))",
                    dir.display(),
                    subjects.len()
                );
                subjects
            }
            InputSource::File(file) => {
                validate_input_file(file)?;
                prefix_for_path(file)?;
                vec![file.clone()]
            }
        };

        if !self.config.dry_run {
            fs::create_dir_all(&output_root).map_err(|source| BatchError::CreateOutput {
                path: output_root.clone(),
                source,
            })?;
        }
        info!("Output root: {}", output_root.display());

        let mut report = BatchReport::new(&output_root, self.config.dry_run);
        for volume in &volumes {
            report.push(self.process_volume(volume, &output_root));
        }
        report.finish();

        Ok(report)
    }

    /// Runs the full pipeline for one volume and records what happened.
    pub fn process_volume(&self, volume: &Path, output_root: &Path) -> SubjectOutcome {
        let prefix = match prefix_for_path(volume) {
            Ok(prefix) => prefix,
            Err(e) => {
                error!("{} - skipping {}", e, volume.display());
                return SubjectOutcome::skipped(volume, None, e);
            }
        };

        let working_dir = match self.prepare_workspace(volume, &prefix, output_root) {
            Ok(dir) => dir,
            Err(e) => {
                error!("Subject {}: {} - skipping", prefix, e);
                return SubjectOutcome::skipped(volume, Some(prefix), e);
            }
        };

        if self.config.dry_run {
            info!("Checking commands (no run) for {}", volume.display());
        } else {
            info!("Running pipeline for {}", volume.display());
        }

        let mut run = SubjectRun::new(prefix.clone(), working_dir.clone());
        let result = self.engine.run(&mut run);

        let (status, failed_step) = match run.status() {
            RunStatus::Aborted { step } => (OutcomeStatus::Aborted, Some(step)),
            _ => (OutcomeStatus::Completed, None),
        };

        if !self.config.dry_run {
            info!("Subject {} timeline:\n{}", prefix, run.timeline().summary());
        }

        SubjectOutcome {
            input: volume.to_path_buf(),
            prefix: Some(prefix),
            status,
            workspace: Some(working_dir),
            failed_step,
            failed_command: result.as_ref().err().map(|e| e.command().to_string()),
            error: result.err().map(|e| e.to_string()),
            step_durations_ms: run
                .timeline()
                .durations()
                .into_iter()
                .map(|(step, d)| (step, d.as_millis()))
                .collect(),
        }
    }

    /// Validates the volume and, outside dry runs, stages its workspace.
    fn prepare_workspace(
        &self,
        volume: &Path,
        prefix: &str,
        output_root: &Path,
    ) -> Result<PathBuf, SubjectError> {
        validate_input_file(volume)?;

        if self.config.dry_run {
            return Ok(workspace_dir(output_root, prefix));
        }

        let input_dir = parent_or_current(volume);
        let staged = stage_subject(&input_dir, prefix, &pipeline_inputs(prefix), output_root)?;
        Ok(staged.dir)
    }
}
