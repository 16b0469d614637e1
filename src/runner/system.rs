use std::io;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{CommandLine, CommandOutput, CommandRunner, ExitKind};
use crate::error::BootstrapError;

/// Exit status POSIX shells use for "command not found".
const SHELL_NOT_FOUND: i32 = 127;

/// Spawns real processes via `tokio::process`, one at a time, each bounded by
/// `timeout`. Every child leads its own process group; on timeout the whole
/// group is killed, so pipelines behind `sh -c` do not outlive the step.
pub struct SystemRunner {
    timeout: Duration,
}

impl SystemRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, command: &CommandLine) -> Result<CommandOutput, BootstrapError> {
        let (mut process, is_shell) = match command {
            CommandLine::Exec { program, args } => {
                let mut process = Command::new(program);
                process.args(args);
                (process, false)
            }
            CommandLine::Shell(script) => {
                let mut process = Command::new("sh");
                process.arg("-c").arg(script);
                (process, true)
            }
        };
        process
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        process.process_group(0);

        let child = match process.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(CommandOutput::not_found());
            }
            // Resolved but unusable (permission, exec format): data, not a fault.
            Err(e) => {
                tracing::warn!(%command, error = %e, "command could not be started");
                return Ok(CommandOutput::spawn_failed(&e.to_string()));
            }
        };
        let group = child.id();

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| BootstrapError::Spawn {
                command: command.to_string(),
                source,
            })?,
            Err(_) => {
                if let Some(group) = group {
                    kill_process_group(group);
                }
                tracing::warn!(%command, timeout = ?self.timeout, "command timed out");
                return Ok(CommandOutput::timed_out());
            }
        };

        let exit = match output.status.code() {
            Some(0) => ExitKind::Success,
            Some(SHELL_NOT_FOUND) if is_shell => ExitKind::NotFound,
            code => ExitKind::Failed(code),
        };

        Ok(CommandOutput {
            exit,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(unix)]
fn kill_process_group(group: u32) {
    // SAFETY: killpg only sends a signal; `group` was created for this child.
    let res = unsafe { libc::killpg(group as libc::pid_t, libc::SIGKILL) };
    if res != 0 {
        tracing::debug!(group, error = %io::Error::last_os_error(), "killpg failed");
    }
}

// kill_on_drop still reaps the direct child.
#[cfg(not(unix))]
fn kill_process_group(_group: u32) {}
