use std::fmt;

use serde::Serialize;

use super::probe::{ProbeOutcome, ProbeResult};
use crate::runner::CommandOutput;

/// Controller stage states. Variant order defines the derived `Ord`, and a run
/// only ever moves forward: Unchecked < RunnerChecking < RunnerInstalling
/// < Remediating(0) < Remediating(1) < ... < PrimaryFound < Failed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageState {
    Unchecked,
    RunnerChecking,
    RunnerInstalling,
    Remediating { index: usize, name: String },
    PrimaryFound,
    Failed,
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unchecked => f.write_str("unchecked"),
            Self::RunnerChecking => f.write_str("runner-checking"),
            Self::RunnerInstalling => f.write_str("runner-installing"),
            Self::Remediating { index, name } => write!(f, "remediation {} ({name})", index + 1),
            Self::PrimaryFound => f.write_str("primary-found"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// Failure taxonomy for individual steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    CommandNotFound,
    CommandErrored,
    InstallFailed,
    PrerequisiteMissing,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::CommandNotFound => "command not found",
            Self::CommandErrored => "command errored",
            Self::InstallFailed => "install failed",
            Self::PrerequisiteMissing => "prerequisite missing",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum TraceResult {
    Found { version: String },
    Succeeded,
    Failed { kind: FailureKind, detail: String },
    Skipped { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct TraceEntry {
    pub state: StageState,
    pub command: String,
    #[serde(flatten)]
    pub result: TraceResult,
}

/// Ordered record of every state visited and every command run in one pass.
#[derive(Debug, Clone, Serialize)]
pub struct StageTrace {
    current: StageState,
    entries: Vec<TraceEntry>,
}

impl Default for StageTrace {
    fn default() -> Self {
        Self::new()
    }
}

impl StageTrace {
    pub fn new() -> Self {
        Self {
            current: StageState::Unchecked,
            entries: Vec::new(),
        }
    }

    pub fn current(&self) -> &StageState {
        &self.current
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    /// Move to `next`. Transitions are one-directional.
    pub(crate) fn advance(&mut self, next: StageState) {
        debug_assert!(
            next > self.current,
            "stage transition must move forward: {:?} -> {next:?}",
            self.current
        );
        tracing::info!(from = %self.current, to = %next, "stage transition");
        self.current = next;
    }

    pub(crate) fn record_probe(&mut self, probe: &ProbeResult) {
        let result = match &probe.outcome {
            ProbeOutcome::Found { version } => TraceResult::Found {
                version: version.clone(),
            },
            ProbeOutcome::NotFound => TraceResult::Failed {
                kind: FailureKind::CommandNotFound,
                detail: probe.output.describe(),
            },
            ProbeOutcome::Errored { detail } => TraceResult::Failed {
                kind: FailureKind::CommandErrored,
                detail: detail.clone(),
            },
        };
        self.push(probe.command.to_string(), result);
    }

    pub(crate) fn record_install(&mut self, command: String, output: &CommandOutput) {
        let result = if output.succeeded() {
            TraceResult::Succeeded
        } else {
            TraceResult::Failed {
                kind: FailureKind::InstallFailed,
                detail: output.describe(),
            }
        };
        self.push(command, result);
    }

    pub(crate) fn record_skip(&mut self, command: String, reason: String) {
        self.push(command, TraceResult::Skipped { reason });
    }

    fn push(&mut self, command: String, result: TraceResult) {
        self.entries.push(TraceEntry {
            state: self.current.clone(),
            command,
            result,
        });
    }
}
