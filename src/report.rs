use std::fmt::Write;

use crate::credentials::{CliPresence, CredentialField};
use crate::onboarding::{FailureReason, OnboardingOutcome, OnboardingReport};
use crate::readiness::ready::{InstallPath, ToolReady};
use crate::readiness::stage::TraceResult;

const PREFIX: &str = "iam-policy-autopilot-bootstrap";

/// Process exit status the binary maps each outcome to.
pub fn exit_status(outcome: &OnboardingOutcome) -> u8 {
    match outcome {
        OnboardingOutcome::Complete { .. } => 0,
        OnboardingOutcome::Failed { .. } => 1,
        OnboardingOutcome::CompleteWithCredentialWarning { .. } => 3,
    }
}

pub fn render_json(report: &OnboardingReport) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

/// Human-readable report for stderr.
pub fn render_text(report: &OnboardingReport) -> String {
    let mut out = String::new();

    for entry in report.trace.entries() {
        let result = match &entry.result {
            TraceResult::Found { version } => format!("found {version}"),
            TraceResult::Succeeded => "ok".to_owned(),
            TraceResult::Failed { kind, detail } => format!("{kind}: {detail}"),
            TraceResult::Skipped { reason } => format!("skipped ({reason})"),
        };
        let _ = writeln!(out, "{PREFIX}: [{}] {} -> {result}", entry.state, entry.command);
    }

    match &report.credentials.cli {
        CliPresence::Found { label, version } => {
            let _ = writeln!(out, "{PREFIX}: {label} {version}");
        }
        CliPresence::NotFound { detail } => {
            let _ = writeln!(out, "{PREFIX}: {detail}");
        }
    }
    if let Some(region) = report
        .credentials
        .config
        .as_ref()
        .and_then(|c| c.region.as_deref())
    {
        let _ = writeln!(out, "{PREFIX}: default region {region}");
    }

    match &report.outcome {
        OnboardingOutcome::Complete { tool } => {
            let _ = writeln!(out, "{PREFIX}: ready ({})", describe_tool(tool));
        }
        OnboardingOutcome::CompleteWithCredentialWarning { tool, missing } => {
            let _ = writeln!(out, "{PREFIX}: ready ({})", describe_tool(tool));
            let fields: Vec<_> = missing.iter().map(|f| f.row_name()).collect();
            let _ = writeln!(
                out,
                "{PREFIX} (warning): credentials not configured: {}. \
                 Calls will fail until they are set{}.",
                fields.join(", "),
                if missing.contains(&CredentialField::AccessKey) {
                    " (run `aws configure`)"
                } else {
                    ""
                }
            );
        }
        OnboardingOutcome::Failed {
            reason,
            remediation_steps_exhausted,
        } => {
            let why = match reason {
                FailureReason::PrerequisiteMissing { detail } => {
                    format!("prerequisite missing: {detail}")
                }
                FailureReason::RemediationExhausted { attempted } => format!(
                    "no install method succeeded (tried {})",
                    attempted.join(", ")
                ),
                FailureReason::ToolMissing { kind } => {
                    format!("tool not usable ({kind}) and installs are disabled")
                }
            };
            let _ = writeln!(out, "{PREFIX}: setup failed: {why}");
            if *remediation_steps_exhausted {
                let _ = writeln!(out, "{PREFIX}: all automated install methods were exhausted");
            }
            let _ = writeln!(
                out,
                "{PREFIX}: do not retry automatically; follow the setup guide at {}",
                report.docs_url
            );
        }
    }

    out
}

fn describe_tool(tool: &ToolReady) -> String {
    match tool.via() {
        InstallPath::AlreadyInstalled => format!("version {}, already installed", tool.version()),
        InstallPath::Runner => format!("version {}, installed via runner", tool.version()),
        InstallPath::Remediation { step } => {
            format!("version {}, installed via {step}", tool.version())
        }
    }
}
