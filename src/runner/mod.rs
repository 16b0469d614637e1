pub mod system;

use std::fmt;

use async_trait::async_trait;

use crate::error::BootstrapError;

/// A command the bootstrap may execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
    /// Program resolved on `PATH`, invoked with explicit arguments.
    Exec { program: String, args: Vec<String> },
    /// Script handed to `sh -c`. Used for pipelines such as `curl ... | sudo sh`.
    Shell(String),
}

impl CommandLine {
    pub fn exec<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Exec {
            program: program.to_owned(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn shell(script: &str) -> Self {
        Self::Shell(script.to_owned())
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exec { program, args } => {
                f.write_str(program)?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                Ok(())
            }
            Self::Shell(script) => f.write_str(script),
        }
    }
}

/// How a finished command exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    Success,
    /// The program could not be resolved: spawn `NotFound` for an exec, exit
    /// 127 from `sh -c` for a shell command.
    NotFound,
    /// Ran and exited non-zero. `None` when killed by a signal.
    Failed(Option<i32>),
    /// Resolved but could not be started (not executable, wrong format).
    /// The OS error is kept in `stderr`.
    SpawnFailed,
    TimedOut,
}

/// Fully consumed result of one command: exit plus both output streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit: ExitKind,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(stdout: &str) -> Self {
        Self {
            exit: ExitKind::Success,
            stdout: stdout.to_owned(),
            stderr: String::new(),
        }
    }

    pub fn not_found() -> Self {
        Self {
            exit: ExitKind::NotFound,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: &str) -> Self {
        Self {
            exit: ExitKind::Failed(Some(code)),
            stdout: String::new(),
            stderr: stderr.to_owned(),
        }
    }

    pub fn spawn_failed(error: &str) -> Self {
        Self {
            exit: ExitKind::SpawnFailed,
            stdout: String::new(),
            stderr: error.to_owned(),
        }
    }

    pub fn timed_out() -> Self {
        Self {
            exit: ExitKind::TimedOut,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit == ExitKind::Success
    }

    /// One-line summary for logs and traces.
    pub fn describe(&self) -> String {
        let tail = first_line(&self.stderr)
            .or_else(|| first_line(&self.stdout))
            .map(|line| format!(": {line}"))
            .unwrap_or_default();
        match self.exit {
            ExitKind::Success => "exited 0".to_owned(),
            ExitKind::NotFound => "command not found".to_owned(),
            ExitKind::Failed(Some(code)) => format!("exited with status {code}{tail}"),
            ExitKind::Failed(None) => format!("terminated by signal{tail}"),
            ExitKind::SpawnFailed => format!("could not be started{tail}"),
            ExitKind::TimedOut => "timed out".to_owned(),
        }
    }
}

fn first_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).find(|l| !l.is_empty())
}

/// Executes commands on behalf of the controllers. The one `dyn`-capable seam
/// between decision logic and the host: tests script it, `SystemRunner`
/// spawns real processes.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command` to completion. Calls never overlap.
    async fn run(&self, command: &CommandLine) -> Result<CommandOutput, BootstrapError>;
}

/// True unless `program --version` cannot be resolved at all. A program that
/// exists but errors on `--version` still counts as present.
pub async fn command_exists<R>(runner: &R, program: &str) -> Result<bool, BootstrapError>
where
    R: CommandRunner + ?Sized,
{
    let output = runner
        .run(&CommandLine::exec(program, ["--version"]))
        .await?;
    Ok(output.exit != ExitKind::NotFound)
}

/// Run `command` and fold its exit into pass/fail. The output is returned
/// either way so the caller can trace it.
pub async fn exec_and_check<R>(
    runner: &R,
    command: &CommandLine,
) -> Result<Result<CommandOutput, CommandOutput>, BootstrapError>
where
    R: CommandRunner + ?Sized,
{
    tracing::debug!(%command, "executing");
    let output = runner.run(command).await?;
    if output.succeeded() {
        Ok(Ok(output))
    } else {
        Ok(Err(output))
    }
}
