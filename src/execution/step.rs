//! Individual Step Execution
//!
//! Spawns a single expanded command as a child process in an explicit
//! working directory, captures its output and classifies the result.
//!
//! The [`StepRunner`] trait is the seam between the execution loop and the
//! operating system, so the loop can be driven without real MRtrix tools.

use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info};
use thiserror::Error;

use crate::pipeline::ExpandedCommand;

/// Interval between exit checks while a step runs under a timeout.
const TIMEOUT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Captured output of a successful step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Why a step failed.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("step {step} could not be launched ({command}): {source}")]
    Spawn {
        step: usize,
        command: String,
        source: io::Error,
    },

    #[error("step {step} failed while waiting for completion ({command}): {source}")]
    Wait {
        step: usize,
        command: String,
        source: io::Error,
    },

    #[error("step {step} exited with status {code} ({command})")]
    NonZeroExit {
        step: usize,
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("step {step} was terminated by a signal ({command})")]
    Signaled {
        step: usize,
        command: String,
        stderr: String,
    },

    #[error("step {step} timed out after {timeout:?} ({command})")]
    TimedOut {
        step: usize,
        command: String,
        timeout: Duration,
    },
}

impl StepError {
    /// The 1-based step number that failed.
    pub fn step(&self) -> usize {
        match self {
            Self::Spawn { step, .. }
            | Self::Wait { step, .. }
            | Self::NonZeroExit { step, .. }
            | Self::Signaled { step, .. }
            | Self::TimedOut { step, .. } => *step,
        }
    }

    /// The rendered command that failed.
    pub fn command(&self) -> &str {
        match self {
            Self::Spawn { command, .. }
            | Self::Wait { command, .. }
            | Self::NonZeroExit { command, .. }
            | Self::Signaled { command, .. }
            | Self::TimedOut { command, .. } => command,
        }
    }
}

/// Runs one expanded command to completion.
pub trait StepRunner {
    fn run(&self, command: &ExpandedCommand, working_dir: &Path) -> Result<StepOutput, StepError>;
}

/// Runs steps as real child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    /// Creates a runner with no per-step timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Kills and fails any step running longer than `timeout`.
    ///
    /// On Unix a timed step runs in its own process group and the whole
    /// group is killed, so helpers a wrapper script started (`eddy` and
    /// `topup` under `dwipreproc`) do not outlive it. Untimed steps stay in
    /// the driver's group and receive terminal signals with it.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn spawn(&self, command: &ExpandedCommand, working_dir: &Path) -> Result<Child, StepError> {
        debug!("Executing in directory: {}", working_dir.display());

        let mut cmd = command.to_command(working_dir);
        if self.timeout.is_some() {
            own_process_group(&mut cmd);
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| StepError::Spawn {
                step: command.order,
                command: command.to_string(),
                source,
            })
    }
}

impl StepRunner for ProcessRunner {
    fn run(&self, command: &ExpandedCommand, working_dir: &Path) -> Result<StepOutput, StepError> {
        let child = self.spawn(command, working_dir)?;

        let output = match self.timeout {
            None => child.wait_with_output().map_err(|source| StepError::Wait {
                step: command.order,
                command: command.to_string(),
                source,
            })?,
            Some(limit) => wait_with_timeout(child, command, limit)?,
        };

        classify_output(command, output)
    }
}

/// Waits for a child, killing it once `limit` has elapsed.
///
/// Pipes are drained on separate threads so a chatty tool cannot block on a
/// full pipe while we poll for its exit.
fn wait_with_timeout(
    mut child: Child,
    command: &ExpandedCommand,
    limit: Duration,
) -> Result<Output, StepError> {
    let wait_error = |source: io::Error| StepError::Wait {
        step: command.order,
        command: command.to_string(),
        source,
    };

    let stdout_reader = child.stdout.take().map(drain_pipe);
    let stderr_reader = child.stderr.take().map(drain_pipe);

    let started = Instant::now();
    let status: ExitStatus = loop {
        if let Some(status) = child.try_wait().map_err(wait_error)? {
            break status;
        }

        if started.elapsed() >= limit {
            if let Err(e) = kill_step(&mut child) {
                error!("Failed to kill timed out step {}: {}", command.order, e);
            }
            // Reap the child; readers are detached since grandchildren may
            // still hold the pipes open
            let _ = child.wait();
            drop(stdout_reader);
            drop(stderr_reader);

            return Err(StepError::TimedOut {
                step: command.order,
                command: command.to_string(),
                timeout: limit,
            });
        }

        thread::sleep(TIMEOUT_POLL_INTERVAL);
    };

    Ok(Output {
        status,
        stdout: join_reader(stdout_reader),
        stderr: join_reader(stderr_reader),
    })
}

#[cfg(unix)]
fn own_process_group(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn own_process_group(_cmd: &mut Command) {}

/// Kills a timed out step and, on Unix, the rest of its process group.
#[cfg(unix)]
fn kill_step(child: &mut Child) -> io::Result<()> {
    let group = format!("-{}", child.id());
    match Command::new("kill").args(["-KILL", "--", &group]).status() {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => {
            debug!("kill {} exited with {}; killing the direct child only", group, status);
            child.kill()
        }
        Err(e) => {
            debug!("Could not run kill for group {}: {}", group, e);
            child.kill()
        }
    }
}

#[cfg(not(unix))]
fn kill_step(child: &mut Child) -> io::Result<()> {
    child.kill()
}

fn drain_pipe<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Err(e) = pipe.read_to_end(&mut buf) {
            debug!("Pipe read ended early: {}", e);
        }
        buf
    })
}

fn join_reader(reader: Option<thread::JoinHandle<Vec<u8>>>) -> Vec<u8> {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

/// Maps a finished process to success or the matching [`StepError`].
fn classify_output(command: &ExpandedCommand, output: Output) -> Result<StepOutput, StepError> {
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if output.status.success() {
        debug!("Step {} completed successfully", command.order);

        if !stdout.trim().is_empty() {
            info!("{}", stdout.trim_end());
        }
        if !stderr.trim().is_empty() {
            debug!("stderr:\n{}", stderr.trim_end());
        }

        return Ok(StepOutput { stdout, stderr });
    }

    error!(
        "Step {} failed with exit code: {:?}",
        command.order,
        output.status.code()
    );
    if !stderr.trim().is_empty() {
        error!("stderr:\n{}", stderr.trim_end());
    }
    if !stdout.trim().is_empty() {
        info!("stdout:\n{}", stdout.trim_end());
    }

    match output.status.code() {
        Some(code) => Err(StepError::NonZeroExit {
            step: command.order,
            command: command.to_string(),
            code,
            stderr,
        }),
        None => Err(StepError::Signaled {
            step: command.order,
            command: command.to_string(),
            stderr,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn shell(order: usize, script: &str) -> ExpandedCommand {
        ExpandedCommand {
            order,
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
        }
    }

    #[test]
    fn test_step_error_accessors() {
        let err = StepError::TimedOut {
            step: 3,
            command: "dwipreproc AP 003-dwi-denoised.mif".to_string(),
            timeout: Duration::from_secs(1),
        };
        assert_eq!(err.step(), 3);
        assert!(err.command().starts_with("dwipreproc"));
        assert!(err.to_string().contains("step 3"));
    }

    #[test]
    fn test_spawn_failure_for_missing_program() {
        let temp_dir = tempdir().unwrap();
        let cmd = ExpandedCommand {
            order: 2,
            program: "dwiprep-no-such-tool".to_string(),
            args: vec![],
        };

        let err = ProcessRunner::new().run(&cmd, temp_dir.path()).unwrap_err();
        assert!(matches!(err, StepError::Spawn { step: 2, .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_captures_stdout() {
        let temp_dir = tempdir().unwrap();
        let output = ProcessRunner::new()
            .run(&shell(1, "echo converted"), temp_dir.path())
            .unwrap();

        assert_eq!(output.stdout.trim(), "converted");
    }

    #[cfg(unix)]
    #[test]
    fn test_run_uses_working_directory() {
        let temp_dir = tempdir().unwrap();
        ProcessRunner::new()
            .run(&shell(1, "echo data > 003-dwi.mif"), temp_dir.path())
            .unwrap();

        assert!(temp_dir.path().join("003-dwi.mif").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_non_zero_exit() {
        let temp_dir = tempdir().unwrap();
        let err = ProcessRunner::new()
            .run(&shell(4, "echo broken >&2; exit 3"), temp_dir.path())
            .unwrap_err();

        match err {
            StepError::NonZeroExit { step, code, stderr, .. } => {
                assert_eq!(step, 4);
                assert_eq!(code, 3);
                assert_eq!(stderr.trim(), "broken");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_run_killed_by_signal() {
        let temp_dir = tempdir().unwrap();
        let err = ProcessRunner::new()
            .run(&shell(5, "kill -9 $$"), temp_dir.path())
            .unwrap_err();

        assert!(matches!(err, StepError::Signaled { step: 5, .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_times_out() {
        let temp_dir = tempdir().unwrap();
        let runner = ProcessRunner::new().with_timeout(Duration::from_millis(200));

        let started = Instant::now();
        let err = runner.run(&shell(3, "sleep 5"), temp_dir.path()).unwrap_err();

        assert!(matches!(err, StepError::TimedOut { step: 3, .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_background_helpers() {
        let temp_dir = tempdir().unwrap();
        let runner = ProcessRunner::new().with_timeout(Duration::from_millis(200));

        let err = runner
            .run(
                &shell(3, "(sleep 1; echo late > late.txt) & wait"),
                temp_dir.path(),
            )
            .unwrap_err();
        assert!(matches!(err, StepError::TimedOut { step: 3, .. }));

        thread::sleep(Duration::from_millis(1500));
        assert!(!temp_dir.path().join("late.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_within_timeout_succeeds() {
        let temp_dir = tempdir().unwrap();
        let runner = ProcessRunner::new().with_timeout(Duration::from_secs(10));

        let output = runner.run(&shell(6, "echo response"), temp_dir.path()).unwrap();
        assert_eq!(output.stdout.trim(), "response");
    }

    #[test]
    fn test_runner_timeout_configuration() {
        assert!(ProcessRunner::new().timeout().is_none());
        let runner = ProcessRunner::new().with_timeout(Duration::from_secs(30));
        assert_eq!(runner.timeout(), Some(Duration::from_secs(30)));
    }
}
