use crate::runner::CommandLine;

/// One ordered fallback install. Success is never taken from the install's own
/// exit code: the controller always re-probes the primary tool afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemediationStep {
    pub name: String,
    /// Program that must resolve before `install` is attempted.
    pub requires: Option<String>,
    pub install: CommandLine,
}

/// Default chain, least invasive first: package installer, then the
/// privileged install script.
pub fn default_chain(tool: &str, install_script_url: &str) -> Vec<RemediationStep> {
    vec![
        RemediationStep {
            name: "pip".to_owned(),
            requires: Some("pip".to_owned()),
            install: CommandLine::exec("pip", ["install", "--no-input", tool]),
        },
        RemediationStep {
            name: "install-script".to_owned(),
            requires: None,
            install: CommandLine::shell(&format!("curl -sSL {install_script_url} | sudo sh")),
        },
    ]
}
