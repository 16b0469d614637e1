//! One full onboarding pass: tool readiness, then the credential gate.

use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::BootstrapConfig;
use crate::credentials::{CliPresence, CredentialField, CredentialGate, CredentialStatus};
use crate::error::BootstrapError;
use crate::readiness::ready::ToolReady;
use crate::readiness::stage::{FailureKind, StageTrace};
use crate::readiness::{ReadinessController, ToolFailure, ToolStageOutcome};
use crate::runner::CommandRunner;

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Probe only; never execute an install command.
    pub check_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FailureReason {
    /// The secondary CLI is absent. Terminal regardless of the tool stage.
    PrerequisiteMissing { detail: String },
    /// Every remediation step ran or was skipped and the tool never resolved.
    RemediationExhausted { attempted: Vec<String> },
    /// Check-only run found no usable tool.
    ToolMissing { kind: FailureKind },
}

impl From<ToolFailure> for FailureReason {
    fn from(failure: ToolFailure) -> Self {
        match failure {
            ToolFailure::RemediationExhausted { attempted } => {
                Self::RemediationExhausted { attempted }
            }
            ToolFailure::ToolMissing { kind } => Self::ToolMissing { kind },
        }
    }
}

/// Final state of a run. The completion variants can only be built from a
/// `ToolReady` proof.
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OnboardingOutcome {
    Complete {
        tool: ToolReady,
    },
    CompleteWithCredentialWarning {
        tool: ToolReady,
        missing: Vec<CredentialField>,
    },
    /// Non-retryable. The caller halts and points the user at the docs.
    Failed {
        #[serde(flatten)]
        reason: FailureReason,
        remediation_steps_exhausted: bool,
    },
}

impl OnboardingOutcome {
    pub fn is_complete(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

#[derive(Debug, Serialize)]
pub struct OnboardingReport {
    pub run_id: Uuid,
    #[serde(flatten)]
    pub outcome: OnboardingOutcome,
    pub trace: StageTrace,
    pub credentials: CredentialStatus,
    pub docs_url: String,
}

/// Run every stage in order against `runner`. Re-probes from scratch each
/// time; nothing carries over between runs.
pub async fn run_onboarding<R>(
    runner: &R,
    config: &BootstrapConfig,
    options: RunOptions,
) -> Result<OnboardingReport, BootstrapError>
where
    R: CommandRunner + ?Sized,
{
    let run_id = Uuid::now_v7();
    let span = tracing::info_span!("onboarding", %run_id, check_only = options.check_only);

    async move {
        let tool_stage = ReadinessController::new(runner, &config.tool)
            .check_only(options.check_only)
            .ensure_primary_tool()
            .await?;
        let exhausted = tool_stage.outcome.remediation_exhausted();

        let credentials = CredentialGate::new(runner, &config.credentials)
            .check()
            .await?;

        let outcome = decide(tool_stage.outcome, &credentials, exhausted);
        match &outcome {
            OnboardingOutcome::Complete { .. } => tracing::info!("onboarding complete"),
            OnboardingOutcome::CompleteWithCredentialWarning { missing, .. } => {
                tracing::warn!(?missing, "onboarding complete with credential warning");
            }
            OnboardingOutcome::Failed { reason, .. } => {
                tracing::error!(?reason, "onboarding failed");
            }
        }

        Ok::<_, BootstrapError>(OnboardingReport {
            run_id,
            outcome,
            trace: tool_stage.trace,
            credentials,
            docs_url: config.docs_url.clone(),
        })
    }
    .instrument(span)
    .await
}

fn decide(
    tool: ToolStageOutcome,
    credentials: &CredentialStatus,
    remediation_steps_exhausted: bool,
) -> OnboardingOutcome {
    if let CliPresence::NotFound { detail } = &credentials.cli {
        return OnboardingOutcome::Failed {
            reason: FailureReason::PrerequisiteMissing {
                detail: detail.clone(),
            },
            remediation_steps_exhausted,
        };
    }

    let tool = match tool {
        ToolStageOutcome::Ready(tool) => tool,
        ToolStageOutcome::Failed(failure) => {
            return OnboardingOutcome::Failed {
                reason: failure.into(),
                remediation_steps_exhausted,
            };
        }
    };

    let missing = credentials
        .config
        .as_ref()
        .map(|c| c.missing())
        .unwrap_or_default();
    if missing.is_empty() {
        OnboardingOutcome::Complete { tool }
    } else {
        OnboardingOutcome::CompleteWithCredentialWarning { tool, missing }
    }
}
