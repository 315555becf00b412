//! Subject Execution Loop
//!
//! Runs the expanded commands of one subject strictly in order. In dry-run
//! mode the commands are only printed. In execute mode each command is
//! spawned in the subject's working directory and the run stops at the first
//! failure: every step consumes the output of earlier ones, so later steps
//! are never attempted. Files written by earlier steps are left in place.

use std::path::{Path, PathBuf};

use log::{error, info};

use crate::monitoring::{EventType, ExecutionTimeline};
use crate::pipeline::{expand_pipeline, ExpandedCommand};

use super::step::{ProcessRunner, StepError, StepRunner};

/// Lifecycle of a subject run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    /// Stopped at the given 1-based step
    Aborted { step: usize },
}

/// The ordered commands of one subject plus where they run.
#[derive(Debug, Clone)]
pub struct SubjectRun {
    prefix: String,
    commands: Vec<ExpandedCommand>,
    working_dir: PathBuf,
    status: RunStatus,
    timeline: ExecutionTimeline,
}

impl SubjectRun {
    /// Expands the preprocessing pipeline for `prefix`.
    pub fn new(prefix: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        let prefix = prefix.into();
        let commands = expand_pipeline(&prefix);
        Self::with_commands(prefix, commands, working_dir)
    }

    /// Builds a run from an explicit command list.
    pub fn with_commands(
        prefix: impl Into<String>,
        commands: Vec<ExpandedCommand>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            commands,
            working_dir: working_dir.into(),
            status: RunStatus::Pending,
            timeline: ExecutionTimeline::new(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn commands(&self) -> &[ExpandedCommand] {
        &self.commands
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn timeline(&self) -> &ExecutionTimeline {
        &self.timeline
    }
}

/// Executes subject runs.
///
/// # Example
///
/// ```rust,no_run
/// use dwiprep::execution::{Engine, SubjectRun};
///
/// let engine = Engine::new();
/// let mut run = SubjectRun::new("003", "/data/out/003");
/// engine.run(&mut run)?;
/// # Ok::<(), dwiprep::execution::StepError>(())
/// ```
pub struct Engine<R: StepRunner = ProcessRunner> {
    runner: R,
    dry_run: bool,
}

impl Engine<ProcessRunner> {
    /// Creates an engine that spawns real processes.
    pub fn new() -> Self {
        Self::with_runner(ProcessRunner::new())
    }
}

impl Default for Engine<ProcessRunner> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: StepRunner> Engine<R> {
    /// Creates an engine around a custom step runner.
    pub fn with_runner(runner: R) -> Self {
        Self {
            runner,
            dry_run: false,
        }
    }

    /// Enables or disables dry run mode.
    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.dry_run = dry_run;
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Runs every command of `run` in order.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - All steps finished with exit status zero (or dry run)
    /// * `Err` - The first failing step; the run is left `Aborted`
    pub fn run(&self, run: &mut SubjectRun) -> Result<(), StepError> {
        run.status = RunStatus::Running;
        run.timeline = ExecutionTimeline::new();

        if self.dry_run {
            self.print_commands(run);
            run.status = RunStatus::Completed;
            return Ok(());
        }

        let total = run.commands.len();
        for command in &run.commands {
            info!("Executing step {}/{}: {}", command.order, total, command);
            run.timeline.add_event(command.order, EventType::Started);

            match self.runner.run(command, &run.working_dir) {
                Ok(_) => {
                    run.timeline.add_event(command.order, EventType::Completed);
                }
                Err(e) => {
                    run.timeline.add_event(e.step(), EventType::Failed);
                    run.status = RunStatus::Aborted { step: e.step() };
                    error!("Subject {} aborted at step {}: {}", run.prefix, e.step(), e);
                    return Err(e);
                }
            }
        }

        run.status = RunStatus::Completed;
        info!(
            "Subject {} completed {} step(s) in {:.2?}",
            run.prefix,
            total,
            run.timeline.elapsed()
        );
        Ok(())
    }

    fn print_commands(&self, run: &SubjectRun) {
        println!();
        println!(
            "[DRY RUN] Subject {} (working directory: {})",
            run.prefix,
            run.working_dir.display()
        );
        for command in &run.commands {
            println!("  {}: {}", command.order, command);
        }
    }
}
