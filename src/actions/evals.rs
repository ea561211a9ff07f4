//! The `aaa_evals.run` action (also registered as `evals.run`).
//!
//! Hands a suite name to the external suite runner and reports its exit
//! code and captured output. A non-zero exit is data, not a failure: the
//! step succeeds and the trace records the result.

use std::path::PathBuf;
use std::process::{Command as ProcessCommand, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use serde_json::json;

use super::{ActionArgs, ActionOutput};
use crate::error::RunbookResult;

/// Scope required by `aaa_evals.run`.
pub const EVAL_RUN_SCOPE: &str = "eval:run";

/// Captured result of a subprocess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code (`-1` when terminated by a signal)
    pub code: i32,
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
}

/// Spawns external commands.
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` to completion, capturing output.
    fn run(&self, program: &str, args: &[String]) -> anyhow::Result<CommandOutput>;
}

/// Runs commands as child processes.
#[derive(Debug, Default, Clone)]
pub struct ProcessRunner {
    /// Working directory for spawned commands
    pub working_dir: Option<PathBuf>,
}

impl ProcessRunner {
    /// Create a runner using the current directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, program: &str, args: &[String]) -> anyhow::Result<CommandOutput> {
        let mut cmd = ProcessCommand::new(program);
        cmd.args(args).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }

        let start = Instant::now();
        let output = cmd.output().with_context(|| format!("failed to spawn '{program}'"))?;
        let duration: Duration = start.elapsed();

        tracing::debug!(program, code = ?output.status.code(), ?duration, "Subprocess finished");

        Ok(CommandOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// The suite-runner command line, minus the suite argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteCommand {
    /// Executable
    pub program: String,
    /// Leading arguments
    pub args: Vec<String>,
}

/// Build the handler.
pub fn handler(
    command: SuiteCommand,
    runner: Arc<dyn CommandRunner>,
) -> impl Fn(&ActionArgs) -> RunbookResult<ActionOutput> + Send + Sync {
    move |args: &ActionArgs| {
        let suite = args.require_str("suite")?;

        let mut argv = command.args.clone();
        argv.push(suite.clone());

        tracing::info!(program = command.program, suite, "Running eval suite");
        let result = runner.run(&command.program, &argv)?;

        let mut out = ActionOutput::new();
        out.insert("suite".to_string(), json!(suite));
        out.insert("returncode".to_string(), json!(result.code));
        out.insert("stdout".to_string(), json!(result.stdout));
        out.insert("stderr".to_string(), json!(result.stderr));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingRunner {
        calls: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl CommandRunner for RecordingRunner {
        fn run(&self, program: &str, args: &[String]) -> anyhow::Result<CommandOutput> {
            self.calls.lock().push((program.to_string(), args.to_vec()));
            Ok(CommandOutput { code: 0, stdout: "eval ok".to_string(), stderr: String::new() })
        }
    }

    fn suite_command() -> SuiteCommand {
        SuiteCommand {
            program: "aaa".to_string(),
            args: vec!["eval".to_string(), "run".to_string()],
        }
    }

    #[test]
    fn test_runs_suite_command() {
        let runner = Arc::new(RecordingRunner::default());
        let run = handler(suite_command(), runner.clone());

        let out = run(&ActionArgs::from_value(json!(["suite", "milestones/v0.5"]))).unwrap();

        assert_eq!(out["stdout"], "eval ok");
        assert_eq!(out["returncode"], 0);
        let calls = runner.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "aaa");
        assert_eq!(calls[0].1, vec!["eval", "run", "milestones/v0.5"]);
    }

    #[test]
    fn test_suite_is_required() {
        let runner = Arc::new(RecordingRunner::default());
        let run = handler(suite_command(), runner.clone());

        assert!(run(&ActionArgs::new()).is_err());
        assert!(runner.calls.lock().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_process_runner_captures_output() {
        let runner = ProcessRunner::new();
        let out = runner.run("sh", &["-c".to_string(), "echo hi; exit 3".to_string()]).unwrap();
        assert_eq!(out.code, 3);
        assert_eq!(out.stdout.trim(), "hi");
    }
}
