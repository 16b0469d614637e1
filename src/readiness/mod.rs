pub mod probe;
pub mod ready;
pub mod remediation;
pub mod stage;

use probe::{ProbeOutcome, ProbeResult, VersionProbe};
use ready::{InstallPath, ToolReady};
use remediation::RemediationStep;
use stage::{FailureKind, StageState, StageTrace};

use crate::error::BootstrapError;
use crate::runner::{self, CommandLine, CommandRunner};

/// Everything the controller needs to know about the primary tool.
#[derive(Debug, Clone)]
pub struct ToolPlan {
    /// `<tool> --version`
    pub primary: VersionProbe,
    /// `<runner> <tool> --version`, ephemeral invocation without install.
    pub runner_probe: VersionProbe,
    /// Persistent install through the runner.
    pub runner_install: CommandLine,
    pub remediation: Vec<RemediationStep>,
}

/// Why the tool stage gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolFailure {
    /// Every remediation step ran (or was skipped) and the re-probe never passed.
    RemediationExhausted { attempted: Vec<String> },
    /// Check-only run: the tool is absent and installs were not allowed.
    ToolMissing { kind: FailureKind },
}

#[derive(Debug)]
pub enum ToolStageOutcome {
    Ready(ToolReady),
    Failed(ToolFailure),
}

impl ToolStageOutcome {
    pub fn remediation_exhausted(&self) -> bool {
        matches!(
            self,
            Self::Failed(ToolFailure::RemediationExhausted { .. })
        )
    }
}

#[derive(Debug)]
pub struct ToolStageReport {
    pub outcome: ToolStageOutcome,
    pub trace: StageTrace,
}

/// Decides, with the fewest probes, whether the primary tool is usable and
/// installs it through the first fallback that actually works.
pub struct ReadinessController<'a, R: ?Sized> {
    runner: &'a R,
    plan: &'a ToolPlan,
    check_only: bool,
}

impl<'a, R> ReadinessController<'a, R>
where
    R: CommandRunner + ?Sized,
{
    pub fn new(runner: &'a R, plan: &'a ToolPlan) -> Self {
        Self {
            runner,
            plan,
            check_only: false,
        }
    }

    /// Probe only; never execute an install command.
    pub fn check_only(mut self, check_only: bool) -> Self {
        self.check_only = check_only;
        self
    }

    pub async fn probe_version(&self, probe: &VersionProbe) -> Result<ProbeResult, BootstrapError> {
        probe.run(self.runner).await
    }

    pub async fn ensure_primary_tool(&self) -> Result<ToolStageReport, BootstrapError> {
        let mut trace = StageTrace::new();

        let primary = self.probe_version(&self.plan.primary).await?;
        trace.record_probe(&primary);
        if let ProbeOutcome::Found { version } = primary.outcome {
            return Ok(ready(trace, version, InstallPath::AlreadyInstalled));
        }
        note_fallthrough(&primary);

        if self.check_only {
            let kind = match primary.outcome {
                ProbeOutcome::NotFound => FailureKind::CommandNotFound,
                _ => FailureKind::CommandErrored,
            };
            return Ok(failed(trace, ToolFailure::ToolMissing { kind }));
        }

        trace.advance(StageState::RunnerChecking);
        let runner_probe = self.probe_version(&self.plan.runner_probe).await?;
        trace.record_probe(&runner_probe);

        if runner_probe.is_found() {
            trace.advance(StageState::RunnerInstalling);
            if let Some(version) = self
                .install_and_reprobe(&self.plan.runner_install, &mut trace)
                .await?
            {
                return Ok(ready(trace, version, InstallPath::Runner));
            }
        } else {
            // Runner absence means missing prerequisites, not a partial install.
            note_fallthrough(&runner_probe);
        }

        let mut attempted = Vec::with_capacity(self.plan.remediation.len());
        for (index, step) in self.plan.remediation.iter().enumerate() {
            trace.advance(StageState::Remediating {
                index,
                name: step.name.clone(),
            });
            attempted.push(step.name.clone());

            if let Some(program) = &step.requires {
                if !runner::command_exists(self.runner, program).await? {
                    tracing::warn!(step = %step.name, %program, "remediation step unavailable");
                    trace.record_skip(
                        format!("{program} --version"),
                        format!("{program} not found"),
                    );
                    continue;
                }
            }

            if let Some(version) = self.install_and_reprobe(&step.install, &mut trace).await? {
                return Ok(ready(
                    trace,
                    version,
                    InstallPath::Remediation {
                        step: step.name.clone(),
                    },
                ));
            }
        }

        tracing::error!(steps = ?attempted, "remediation chain exhausted");
        Ok(failed(trace, ToolFailure::RemediationExhausted { attempted }))
    }

    /// Run `install`, then re-probe the primary tool. `Some(version)` only when
    /// the re-probe finds it: an installer reporting success is not enough.
    async fn install_and_reprobe(
        &self,
        install: &CommandLine,
        trace: &mut StageTrace,
    ) -> Result<Option<String>, BootstrapError> {
        let output = match runner::exec_and_check(self.runner, install).await? {
            Ok(output) => output,
            Err(output) => {
                tracing::warn!(command = %install, outcome = %output.describe(), "install failed");
                trace.record_install(install.to_string(), &output);
                return Ok(None);
            }
        };
        trace.record_install(install.to_string(), &output);

        let reprobe = self.probe_version(&self.plan.primary).await?;
        trace.record_probe(&reprobe);
        match reprobe.outcome {
            ProbeOutcome::Found { version } => Ok(Some(version)),
            _ => {
                tracing::warn!(
                    command = %install,
                    "install reported success but the tool is still not resolvable"
                );
                Ok(None)
            }
        }
    }
}

fn ready(mut trace: StageTrace, version: String, via: InstallPath) -> ToolStageReport {
    trace.advance(StageState::PrimaryFound);
    tracing::info!(%version, ?via, "primary tool ready");
    ToolStageReport {
        outcome: ToolStageOutcome::Ready(ToolReady::new(version, via)),
        trace,
    }
}

fn failed(mut trace: StageTrace, failure: ToolFailure) -> ToolStageReport {
    trace.advance(StageState::Failed);
    ToolStageReport {
        outcome: ToolStageOutcome::Failed(failure),
        trace,
    }
}

// An erroring-but-present tool falls through exactly like a missing one; the
// detail is surfaced at warn so a version mismatch does not disappear silently.
fn note_fallthrough(probe: &ProbeResult) {
    match &probe.outcome {
        ProbeOutcome::Errored { detail } => {
            tracing::warn!(
                command = %probe.command,
                %detail,
                "present but errored, falling through"
            );
        }
        _ => tracing::info!(command = %probe.command, "not found, falling through"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::probe::VersionPattern;
    use super::stage::TraceResult;
    use super::*;
    use crate::runner::CommandOutput;

    const TOOL: &str = "iam-policy-autopilot";
    const FOUND: &str = "iam-policy-autopilot: 0.1.2";

    /// Replies from per-command queues; the last reply repeats. Unknown
    /// commands are not found.
    #[derive(Default)]
    struct Scripted {
        replies: Mutex<HashMap<String, VecDeque<CommandOutput>>>,
        calls: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn on(self, command: &str, replies: impl IntoIterator<Item = CommandOutput>) -> Self {
            self.replies
                .lock()
                .unwrap()
                .insert(command.to_owned(), replies.into_iter().collect());
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for Scripted {
        async fn run(&self, command: &CommandLine) -> Result<CommandOutput, BootstrapError> {
            let key = command.to_string();
            self.calls.lock().unwrap().push(key.clone());
            let mut replies = self.replies.lock().unwrap();
            let reply = match replies.get_mut(&key) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            };
            Ok(reply.unwrap_or_else(CommandOutput::not_found))
        }
    }

    fn plan() -> ToolPlan {
        let pattern = VersionPattern::new(TOOL).unwrap();
        ToolPlan {
            primary: VersionProbe::new(CommandLine::exec(TOOL, ["--version"]), pattern.clone()),
            runner_probe: VersionProbe::new(
                CommandLine::exec("uvx", [TOOL, "--version"]),
                pattern,
            ),
            runner_install: CommandLine::exec("uv", ["tool", "install", TOOL]),
            remediation: remediation::default_chain(TOOL, "https://example.test/install.sh"),
        }
    }

    #[tokio::test]
    async fn present_tool_short_circuits() {
        let runner = Scripted::default()
            .on("iam-policy-autopilot --version", [CommandOutput::success(FOUND)]);
        let plan = plan();
        let report = ReadinessController::new(&runner, &plan)
            .ensure_primary_tool()
            .await
            .unwrap();

        match report.outcome {
            ToolStageOutcome::Ready(ready) => {
                assert_eq!(ready.version(), "0.1.2");
                assert_eq!(ready.via(), &InstallPath::AlreadyInstalled);
            }
            ToolStageOutcome::Failed(f) => panic!("expected Ready, got {f:?}"),
        }
        assert_eq!(runner.calls(), ["iam-policy-autopilot --version"]);
        assert_eq!(report.trace.current(), &StageState::PrimaryFound);
    }

    #[tokio::test]
    async fn runner_path_installs_and_reprobes() {
        let runner = Scripted::default()
            .on(
                "iam-policy-autopilot --version",
                [CommandOutput::not_found(), CommandOutput::success(FOUND)],
            )
            .on("uvx iam-policy-autopilot --version", [CommandOutput::success(FOUND)])
            .on("uv tool install iam-policy-autopilot", [CommandOutput::success("")]);
        let plan = plan();
        let report = ReadinessController::new(&runner, &plan)
            .ensure_primary_tool()
            .await
            .unwrap();

        assert!(matches!(
            &report.outcome,
            ToolStageOutcome::Ready(r) if r.via() == &InstallPath::Runner
        ));
        assert_eq!(
            runner.calls(),
            [
                "iam-policy-autopilot --version",
                "uvx iam-policy-autopilot --version",
                "uv tool install iam-policy-autopilot",
                "iam-policy-autopilot --version",
            ]
        );
    }

    #[tokio::test]
    async fn unstartable_tool_and_installer_fall_through() {
        let denied = || CommandOutput::spawn_failed("Permission denied (os error 13)");
        let runner = Scripted::default()
            .on(
                "iam-policy-autopilot --version",
                [denied(), CommandOutput::success(FOUND)],
            )
            .on("pip --version", [denied()])
            .on("pip install --no-input iam-policy-autopilot", [denied()])
            .on(
                "curl -sSL https://example.test/install.sh | sudo sh",
                [CommandOutput::success("")],
            );
        let plan = plan();
        let report = ReadinessController::new(&runner, &plan)
            .ensure_primary_tool()
            .await
            .unwrap();

        assert!(matches!(
            &report.outcome,
            ToolStageOutcome::Ready(r)
                if r.via() == &InstallPath::Remediation { step: "install-script".to_owned() }
        ));
        let entries = report.trace.entries();
        assert!(matches!(
            &entries[0].result,
            TraceResult::Failed { kind: FailureKind::CommandErrored, detail }
                if detail.contains("Permission denied")
        ));
        assert!(entries.iter().any(|e| {
            e.command == "pip install --no-input iam-policy-autopilot"
                && matches!(e.result, TraceResult::Failed { kind: FailureKind::InstallFailed, .. })
        }));
    }

    #[tokio::test]
    async fn runner_install_failure_falls_to_remediation() {
        let runner = Scripted::default()
            .on("uvx iam-policy-autopilot --version", [CommandOutput::success(FOUND)])
            .on("uv tool install iam-policy-autopilot", [CommandOutput::failed(2, "network")]);
        let plan = plan();
        let report = ReadinessController::new(&runner, &plan)
            .ensure_primary_tool()
            .await
            .unwrap();

        let calls = runner.calls();
        // No re-probe after a failed install; next is the pip presence check.
        assert_eq!(calls[2], "uv tool install iam-policy-autopilot");
        assert_eq!(calls[3], "pip --version");
        assert!(report.outcome.remediation_exhausted());
    }

    #[tokio::test]
    async fn errored_primary_still_falls_through() {
        let runner = Scripted::default()
            .on(
                "iam-policy-autopilot --version",
                [CommandOutput::failed(1, "incompatible glibc"), CommandOutput::success(FOUND)],
            )
            .on("pip --version", [CommandOutput::success("pip 24.0")])
            .on("pip install --no-input iam-policy-autopilot", [CommandOutput::success("")]);
        let plan = plan();
        let report = ReadinessController::new(&runner, &plan)
            .ensure_primary_tool()
            .await
            .unwrap();

        assert!(matches!(
            &report.outcome,
            ToolStageOutcome::Ready(r)
                if r.via() == &InstallPath::Remediation { step: "pip".to_owned() }
        ));
        assert!(matches!(
            &report.trace.entries()[0].result,
            TraceResult::Failed { kind: FailureKind::CommandErrored, .. }
        ));
    }

    #[tokio::test]
    async fn missing_pip_is_skipped_not_run() {
        let runner = Scripted::default().on(
            "curl -sSL https://example.test/install.sh | sudo sh",
            [CommandOutput::failed(1, "sudo: a password is required")],
        );
        let plan = plan();
        let report = ReadinessController::new(&runner, &plan)
            .ensure_primary_tool()
            .await
            .unwrap();

        let calls = runner.calls();
        assert!(!calls.iter().any(|c| c.starts_with("pip install")));
        match report.outcome {
            ToolStageOutcome::Failed(ToolFailure::RemediationExhausted { attempted }) => {
                assert_eq!(attempted, ["pip", "install-script"]);
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert!(report
            .trace
            .entries()
            .iter()
            .any(|e| matches!(
                &e.result,
                TraceResult::Skipped { reason } if reason == "pip not found"
            )));
        assert_eq!(report.trace.current(), &StageState::Failed);
    }

    #[tokio::test]
    async fn check_only_never_installs() {
        let runner = Scripted::default();
        let plan = plan();
        let report = ReadinessController::new(&runner, &plan)
            .check_only(true)
            .ensure_primary_tool()
            .await
            .unwrap();

        assert_eq!(runner.calls(), ["iam-policy-autopilot --version"]);
        assert!(matches!(
            report.outcome,
            ToolStageOutcome::Failed(ToolFailure::ToolMissing {
                kind: FailureKind::CommandNotFound
            })
        ));
    }
}
