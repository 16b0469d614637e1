#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use autopilot_bootstrap::error::BootstrapError;
use autopilot_bootstrap::runner::{CommandLine, CommandOutput, CommandRunner};

pub const TOOL: &str = "iam-policy-autopilot";
pub const PIP_INSTALL: &str = "pip install --no-input iam-policy-autopilot";
pub const UV_INSTALL: &str = "uv tool install iam-policy-autopilot";
pub const SCRIPT_INSTALL: &str = concat!(
    "curl -sSL https://github.com/awslabs/iam-policy-autopilot",
    "/raw/refs/heads/main/install.sh | sudo sh"
);

pub const FULL_LISTING: &str = "
      Name                    Value             Type    Location
      ----                    -----             ----    --------
   profile                <not set>             None    None
access_key     ****************ABCD shared-credentials-file
secret_key     ****************EFGH shared-credentials-file
    region                us-east-1      config-file    ~/.aws/config
";

pub const NO_SECRET_LISTING: &str = "
      Name                    Value             Type    Location
      ----                    -----             ----    --------
   profile                <not set>             None    None
access_key     ****************ABCD                 env
secret_key                <not set>             None    None
    region                <not set>             None    None
";

pub const NO_ACCESS_LISTING: &str = "
      Name                    Value             Type    Location
      ----                    -----             ----    --------
   profile                <not set>             None    None
access_key                <not set>             None    None
secret_key     ****************EFGH shared-credentials-file
    region                eu-west-1      config-file    ~/.aws/config
";

/// What an install command does to the fake host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Exits 0 and puts the tool on PATH.
    Places,
    /// Exits 0 without putting the tool on PATH.
    Ineffective,
    /// Exits non-zero.
    Fails,
}

#[derive(Default)]
struct Host {
    installed: HashSet<String>,
    installers: HashMap<String, Effect>,
    /// On PATH, but `--version` exits non-zero.
    broken: HashSet<String>,
    listing: String,
    listing_fails: bool,
}

/// A fake host: a set of programs on PATH plus install commands that may or
/// may not change it. Records every command it is asked to run.
#[derive(Default)]
pub struct FakeHost {
    host: Mutex<Host>,
    calls: Mutex<Vec<String>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(self, program: &str) -> Self {
        self.host.lock().unwrap().installed.insert(program.to_owned());
        self
    }

    pub fn with_installer(self, command: &str, effect: Effect) -> Self {
        self.host
            .lock()
            .unwrap()
            .installers
            .insert(command.to_owned(), effect);
        self
    }

    pub fn with_broken_program(self, program: &str) -> Self {
        let mut host = self.host.lock().unwrap();
        host.installed.insert(program.to_owned());
        host.broken.insert(program.to_owned());
        drop(host);
        self
    }

    pub fn with_failing_listing(self) -> Self {
        self.host.lock().unwrap().listing_fails = true;
        self
    }

    pub fn with_listing(self, listing: &str) -> Self {
        self.host.lock().unwrap().listing = listing.to_owned();
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Calls that hit a registered install command.
    pub fn install_calls(&self) -> Vec<String> {
        let host = self.host.lock().unwrap();
        self.calls()
            .into_iter()
            .filter(|c| host.installers.contains_key(c))
            .collect()
    }
}

fn version_line(program: &str) -> String {
    match program {
        "aws" => "aws-cli/2.15.30 Python/3.11.8 Linux/6.1.0 exe/x86_64".to_owned(),
        "iam-policy-autopilot" => "iam-policy-autopilot: 0.1.2".to_owned(),
        other => format!("{other} 1.0.0"),
    }
}

#[async_trait]
impl CommandRunner for FakeHost {
    async fn run(&self, command: &CommandLine) -> Result<CommandOutput, BootstrapError> {
        let key = command.to_string();
        self.calls.lock().unwrap().push(key.clone());
        let mut host = self.host.lock().unwrap();

        if let CommandLine::Exec { program, args } = command {
            if !host.installed.contains(program) {
                return Ok(CommandOutput::not_found());
            }
            match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
                ["--version"] if host.broken.contains(program) => {
                    return Ok(CommandOutput::failed(1, "ImportError: botocore is broken"));
                }
                ["--version"] => return Ok(CommandOutput::success(&version_line(program))),
                [tool, "--version"] if program == "uvx" => {
                    return Ok(CommandOutput::success(&version_line(tool)));
                }
                ["configure", "list", ..] if host.listing_fails => {
                    return Ok(CommandOutput::failed(255, "The config profile could not be found"));
                }
                ["configure", "list", ..] => return Ok(CommandOutput::success(&host.listing)),
                _ => {}
            }
        }

        let output = match host.installers.get(&key).copied() {
            Some(Effect::Places) => {
                host.installed.insert(TOOL.to_owned());
                CommandOutput::success("installed")
            }
            Some(Effect::Ineffective) => CommandOutput::success("installed"),
            Some(Effect::Fails) => CommandOutput::failed(1, "install failed"),
            None => CommandOutput::not_found(),
        };
        Ok(output)
    }
}
