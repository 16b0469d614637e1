use regex::Regex;
use serde::Serialize;

use crate::error::BootstrapError;
use crate::runner::{CommandLine, CommandOutput, CommandRunner, ExitKind};

/// Classification of a `--version` probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProbeOutcome {
    Found { version: String },
    NotFound,
    /// Present but unusable: non-zero exit, unexpected output, or timeout.
    Errored { detail: String },
}

#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub command: CommandLine,
    pub outcome: ProbeOutcome,
    pub output: CommandOutput,
}

impl ProbeResult {
    pub fn is_found(&self) -> bool {
        matches!(self.outcome, ProbeOutcome::Found { .. })
    }
}

/// Expected shape of a version line: `<label>: 1.2.3`, `<label>/1.2.3` or
/// `<label> 1.2.3`, with an optional leading `v` and any pre-release suffix.
#[derive(Debug, Clone)]
pub struct VersionPattern {
    label: String,
    regex: Regex,
}

impl VersionPattern {
    pub fn new(label: &str) -> Result<Self, BootstrapError> {
        let pattern = format!(
            r"(?m)^\s*{}(?::\s*|/|\s+)v?(\d+\.\d+\.\d+[0-9A-Za-z.+-]*)",
            regex::escape(label)
        );
        let regex = Regex::new(&pattern).map_err(|e| {
            BootstrapError::ConfigValidation(format!("version label '{label}': {e}"))
        })?;
        Ok(Self {
            label: label.to_owned(),
            regex,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Extract the version from stdout, falling back to stderr for tools that
    /// print their banner there.
    pub fn extract(&self, output: &CommandOutput) -> Option<String> {
        [&output.stdout, &output.stderr].into_iter().find_map(|text| {
            self.regex
                .captures(text)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_owned())
        })
    }
}

/// A `--version` invocation plus the shape its output must have.
#[derive(Debug, Clone)]
pub struct VersionProbe {
    pub command: CommandLine,
    pub pattern: VersionPattern,
}

impl VersionProbe {
    pub fn new(command: CommandLine, pattern: VersionPattern) -> Self {
        Self { command, pattern }
    }

    /// Execute and classify. Never mutates the environment.
    pub async fn run<R>(&self, runner: &R) -> Result<ProbeResult, BootstrapError>
    where
        R: CommandRunner + ?Sized,
    {
        tracing::debug!(command = %self.command, "probing");
        let output = runner.run(&self.command).await?;
        let outcome = classify(&output, &self.pattern);
        tracing::debug!(command = %self.command, ?outcome, "probe finished");
        Ok(ProbeResult {
            command: self.command.clone(),
            outcome,
            output,
        })
    }
}

pub fn classify(output: &CommandOutput, pattern: &VersionPattern) -> ProbeOutcome {
    match output.exit {
        ExitKind::NotFound => ProbeOutcome::NotFound,
        ExitKind::Success => match pattern.extract(output) {
            Some(version) => ProbeOutcome::Found { version },
            None => ProbeOutcome::Errored {
                detail: format!(
                    "unexpected version output (expected '{}' followed by a version)",
                    pattern.label()
                ),
            },
        },
        ExitKind::Failed(_) | ExitKind::SpawnFailed | ExitKind::TimedOut => {
            ProbeOutcome::Errored {
                detail: output.describe(),
            }
        }
    }
}
