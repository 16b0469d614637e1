use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::credentials::CredentialPlan;
use crate::error::BootstrapError;
use crate::readiness::ToolPlan;
use crate::readiness::probe::{VersionPattern, VersionProbe};
use crate::readiness::remediation::{self, RemediationStep};
use crate::runner::CommandLine;

const MAX_CONFIG_FILE_SIZE: u64 = 64 * 1024; // 64 KiB
const MAX_TIMEOUT_SECS: u64 = 3600;

pub const DEFAULT_TOOL: &str = "iam-policy-autopilot";
pub const DEFAULT_RUNNER: &str = "uvx";
pub const DEFAULT_RUNNER_INSTALL: [&str; 3] = ["uv", "tool", "install"];
pub const DEFAULT_INSTALL_SCRIPT_URL: &str =
    "https://github.com/awslabs/iam-policy-autopilot/raw/refs/heads/main/install.sh";
pub const DEFAULT_SECONDARY_CLI: &str = "aws";
pub const DEFAULT_SECONDARY_VERSION_LABEL: &str = "aws-cli";
pub const DEFAULT_DOCS_URL: &str = "https://github.com/awslabs/iam-policy-autopilot";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

// --- TOML deserialization structs (private, map 1:1 to TOML schema) ---

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    timeout_secs: Option<u64>,
    docs_url: Option<String>,
    #[serde(default)]
    tool: ToolSection,
    #[serde(default)]
    runner: RunnerSection,
    remediation: Option<Vec<StepSection>>,
    #[serde(default)]
    credentials: CredentialSection,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ToolSection {
    name: Option<String>,
    install_script_url: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RunnerSection {
    program: Option<String>,
    /// Tool name is appended.
    install: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct StepSection {
    name: String,
    requires: Option<String>,
    exec: Option<Vec<String>>,
    shell: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CredentialSection {
    program: Option<String>,
    version_label: Option<String>,
    profile: Option<String>,
}

// --- Compiled config (internal representation) ---

#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    pub tool: ToolPlan,
    pub credentials: CredentialPlan,
    pub timeout: Duration,
    pub docs_url: String,
    secondary_program: String,
}

impl FromStr for BootstrapConfig {
    type Err = BootstrapError;

    /// Parse and validate a config from a TOML string. Absent keys keep their defaults.
    fn from_str(content: &str) -> Result<Self, BootstrapError> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|e| BootstrapError::ConfigLoad(e.to_string()))?;
        compile(file)
    }
}

impl BootstrapConfig {
    /// Built-in defaults, equivalent to an empty file.
    pub fn builtin() -> Result<Self, BootstrapError> {
        compile(ConfigFile::default())
    }

    /// Load from a TOML file. Checks file size before reading.
    pub fn load(path: &Path) -> Result<Self, BootstrapError> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            BootstrapError::ConfigLoad(format!("cannot read {}: {e}", path.display()))
        })?;

        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(BootstrapError::ConfigLoad(format!(
                "config file exceeds {MAX_CONFIG_FILE_SIZE} byte limit"
            )));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            BootstrapError::ConfigLoad(format!("cannot read {}: {e}", path.display()))
        })?;

        content.parse()
    }

    /// Point the credential gate at a named profile.
    pub fn with_profile(mut self, profile: &str) -> Result<Self, BootstrapError> {
        self.credentials.configure_list = configure_list(&self.secondary_program, Some(profile))?;
        Ok(self)
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Result<Self, BootstrapError> {
        self.timeout = timeout(secs)?;
        Ok(self)
    }
}

fn compile(file: ConfigFile) -> Result<BootstrapConfig, BootstrapError> {
    let tool = non_empty("tool.name", file.tool.name, DEFAULT_TOOL)?;
    let script_url = non_empty(
        "tool.install_script_url",
        file.tool.install_script_url,
        DEFAULT_INSTALL_SCRIPT_URL,
    )?;
    let runner = non_empty("runner.program", file.runner.program, DEFAULT_RUNNER)?;

    let mut install = file
        .runner
        .install
        .unwrap_or_else(|| DEFAULT_RUNNER_INSTALL.map(str::to_owned).to_vec());
    if install.is_empty() || install[0].trim().is_empty() {
        return Err(BootstrapError::ConfigValidation(
            "runner.install must name a program".to_owned(),
        ));
    }
    install.push(tool.clone());
    let install_program = install.remove(0);

    let remediation = match file.remediation {
        Some(steps) => compile_steps(steps)?,
        None => remediation::default_chain(&tool, &script_url),
    };

    let pattern = VersionPattern::new(&tool)?;
    let tool_plan = ToolPlan {
        primary: VersionProbe::new(CommandLine::exec(&tool, ["--version"]), pattern.clone()),
        runner_probe: VersionProbe::new(
            CommandLine::exec(&runner, [tool.as_str(), "--version"]),
            pattern,
        ),
        runner_install: CommandLine::exec(&install_program, install),
        remediation,
    };

    let secondary = non_empty(
        "credentials.program",
        file.credentials.program,
        DEFAULT_SECONDARY_CLI,
    )?;
    let label = non_empty(
        "credentials.version_label",
        file.credentials.version_label,
        DEFAULT_SECONDARY_VERSION_LABEL,
    )?;
    let credentials = CredentialPlan {
        version_probe: VersionProbe::new(
            CommandLine::exec(&secondary, ["--version"]),
            VersionPattern::new(&label)?,
        ),
        configure_list: configure_list(&secondary, file.credentials.profile.as_deref())?,
    };

    Ok(BootstrapConfig {
        tool: tool_plan,
        credentials,
        timeout: timeout(file.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))?,
        docs_url: non_empty("docs_url", file.docs_url, DEFAULT_DOCS_URL)?,
        secondary_program: secondary,
    })
}

fn compile_steps(steps: Vec<StepSection>) -> Result<Vec<RemediationStep>, BootstrapError> {
    if steps.is_empty() {
        return Err(BootstrapError::ConfigValidation(
            "remediation must list at least one step".to_owned(),
        ));
    }

    let mut seen = HashSet::new();
    steps
        .into_iter()
        .map(|step| {
            let name = step.name.trim().to_owned();
            if name.is_empty() {
                return Err(BootstrapError::ConfigValidation(
                    "remediation step name must not be empty".to_owned(),
                ));
            }
            if !seen.insert(name.clone()) {
                return Err(BootstrapError::ConfigValidation(format!(
                    "duplicate remediation step '{name}'"
                )));
            }
            let install = match (step.exec, step.shell) {
                (Some(mut argv), None) if !argv.is_empty() => {
                    let program = argv.remove(0);
                    CommandLine::exec(&program, argv)
                }
                (None, Some(script)) if !script.trim().is_empty() => CommandLine::shell(&script),
                _ => {
                    return Err(BootstrapError::ConfigValidation(format!(
                        "remediation step '{name}': \
                         set exactly one of a non-empty `exec` or `shell`"
                    )));
                }
            };
            Ok(RemediationStep {
                name,
                requires: step.requires.filter(|r| !r.trim().is_empty()),
                install,
            })
        })
        .collect()
}

fn configure_list(program: &str, profile: Option<&str>) -> Result<CommandLine, BootstrapError> {
    match profile.map(str::trim) {
        None => Ok(CommandLine::exec(program, ["configure", "list"])),
        Some("") => Err(BootstrapError::ConfigValidation(
            "credentials.profile must not be empty".to_owned(),
        )),
        Some(profile) => Ok(CommandLine::exec(
            program,
            ["configure", "list", "--profile", profile],
        )),
    }
}

fn timeout(secs: u64) -> Result<Duration, BootstrapError> {
    if !(1..=MAX_TIMEOUT_SECS).contains(&secs) {
        return Err(BootstrapError::ConfigValidation(format!(
            "timeout_secs must be between 1 and {MAX_TIMEOUT_SECS}, got {secs}"
        )));
    }
    Ok(Duration::from_secs(secs))
}

fn non_empty(key: &str, value: Option<String>, default: &str) -> Result<String, BootstrapError> {
    match value {
        None => Ok(default.to_owned()),
        Some(v) if v.trim().is_empty() => Err(BootstrapError::ConfigValidation(format!(
            "{key} must not be empty"
        ))),
        Some(v) => Ok(v.trim().to_owned()),
    }
}
