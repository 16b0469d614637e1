//! Credential gate: the AWS CLI must exist and should hold durable keys.
//!
//! Never blocks installation of the primary tool. A missing CLI is terminal;
//! missing keys only annotate the outcome with a warning.

use serde::Serialize;

use crate::error::BootstrapError;
use crate::readiness::probe::{ProbeOutcome, VersionProbe};
use crate::runner::{CommandLine, CommandRunner};

const NOT_SET_MARKER: &str = "<not";

#[derive(Debug, Clone)]
pub struct CredentialPlan {
    /// `aws --version`
    pub version_probe: VersionProbe,
    /// `aws configure list [--profile NAME]`
    pub configure_list: CommandLine,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CliPresence {
    /// `label` is the banner name the version was read from, e.g. `aws-cli`.
    Found { label: String, version: String },
    NotFound { detail: String },
}

/// Presence flags parsed from the configuration listing. Values are never
/// captured, only whether a row carries one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CredentialConfig {
    pub access_key_present: bool,
    pub secret_key_present: bool,
    pub region: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialField {
    AccessKey,
    SecretKey,
}

impl CredentialField {
    pub fn row_name(self) -> &'static str {
        match self {
            Self::AccessKey => "access_key",
            Self::SecretKey => "secret_key",
        }
    }
}

impl CredentialConfig {
    pub fn missing(&self) -> Vec<CredentialField> {
        let mut missing = Vec::new();
        if !self.access_key_present {
            missing.push(CredentialField::AccessKey);
        }
        if !self.secret_key_present {
            missing.push(CredentialField::SecretKey);
        }
        missing
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialStatus {
    pub cli: CliPresence,
    /// `None` when the CLI is absent and the listing was never read.
    pub config: Option<CredentialConfig>,
}

pub struct CredentialGate<'a, R: ?Sized> {
    runner: &'a R,
    plan: &'a CredentialPlan,
}

impl<'a, R> CredentialGate<'a, R>
where
    R: CommandRunner + ?Sized,
{
    pub fn new(runner: &'a R, plan: &'a CredentialPlan) -> Self {
        Self { runner, plan }
    }

    /// An AWS CLI that resolves but errors on `--version` is as unusable as a
    /// missing one, so both report `NotFound`.
    pub async fn probe_secondary_cli(&self) -> Result<CliPresence, BootstrapError> {
        let probe = self.plan.version_probe.run(self.runner).await?;
        Ok(match probe.outcome {
            ProbeOutcome::Found { version } => CliPresence::Found {
                label: self.plan.version_probe.pattern.label().to_owned(),
                version,
            },
            ProbeOutcome::NotFound => CliPresence::NotFound {
                detail: format!("`{}` not found", probe.command),
            },
            ProbeOutcome::Errored { detail } => CliPresence::NotFound {
                detail: format!("`{}` {detail}", probe.command),
            },
        })
    }

    /// A listing command that fails counts as no credentials configured.
    pub async fn read_credential_config(&self) -> Result<CredentialConfig, BootstrapError> {
        let output = self.runner.run(&self.plan.configure_list).await?;
        if !output.succeeded() {
            tracing::warn!(
                command = %self.plan.configure_list,
                outcome = %output.describe(),
                "could not list credential configuration"
            );
            return Ok(CredentialConfig::default());
        }
        Ok(parse_configure_list(&output.stdout))
    }

    pub async fn check(&self) -> Result<CredentialStatus, BootstrapError> {
        let cli = self.probe_secondary_cli().await?;
        if let CliPresence::NotFound { detail } = &cli {
            tracing::error!(%detail, "secondary CLI missing");
            return Ok(CredentialStatus { cli, config: None });
        }

        let config = self.read_credential_config().await?;
        for field in config.missing() {
            tracing::warn!(field = field.row_name(), "credential not set");
        }
        if config.region.is_none() {
            tracing::info!("no default region configured");
        }
        Ok(CredentialStatus {
            cli,
            config: Some(config),
        })
    }
}

/// Parse the tabular output of `aws configure list`:
///
/// ```text
///       Name                    Value             Type    Location
///       ----                    -----             ----    --------
///    profile                <not set>             None    None
/// access_key     ****************ABCD shared-credentials-file
/// secret_key     ****************EFGH shared-credentials-file
///     region                us-east-1      config-file    ~/.aws/config
/// ```
pub fn parse_configure_list(text: &str) -> CredentialConfig {
    let mut config = CredentialConfig::default();
    for line in text.lines() {
        let mut columns = line.split_whitespace();
        let (Some(name), Some(value)) = (columns.next(), columns.next()) else {
            continue;
        };
        let value = (!value.starts_with(NOT_SET_MARKER)).then_some(value);
        match name {
            "access_key" => config.access_key_present = value.is_some(),
            "secret_key" => config.secret_key_present = value.is_some(),
            "region" => config.region = value.map(str::to_owned),
            _ => {}
        }
    }
    config
}
