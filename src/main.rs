use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use autopilot_bootstrap::config::BootstrapConfig;
use autopilot_bootstrap::onboarding::{self, RunOptions};
use autopilot_bootstrap::report;
use autopilot_bootstrap::runner::system::SystemRunner;

const USAGE_ERROR: u8 = 2;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Make sure iam-policy-autopilot is installed and the AWS CLI has credentials.
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    /// TOML file overriding the built-in commands and timeouts.
    #[arg(long, env = "AUTOPILOT_BOOTSTRAP_CONFIG")]
    config: Option<PathBuf>,

    /// AWS profile to check credentials for.
    #[arg(long, env = "AWS_PROFILE")]
    profile: Option<String>,

    /// Per-command timeout in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Probe only; never run an install command.
    #[arg(long)]
    check_only: bool,

    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<BootstrapConfig> {
    let mut config = match &cli.config {
        Some(path) => BootstrapConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => BootstrapConfig::builtin()?,
    };
    if let Some(profile) = &cli.profile {
        config = config.with_profile(profile)?;
    }
    if let Some(secs) = cli.timeout_secs {
        config = config.with_timeout_secs(secs)?;
    }
    Ok(config)
}

async fn run(cli: Cli) -> anyhow::Result<u8> {
    let config = load_config(&cli)?;
    let runner = SystemRunner::new(config.timeout);
    let options = RunOptions {
        check_only: cli.check_only,
    };

    let report = onboarding::run_onboarding(&runner, &config, options)
        .await
        .context("onboarding aborted")?;

    match cli.format {
        OutputFormat::Text => eprint!("{}", report::render_text(&report)),
        OutputFormat::Json => println!(
            "{}",
            report::render_json(&report).context("serializing report")?
        ),
    }
    Ok(report::exit_status(&report.outcome))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(status) => ExitCode::from(status),
        Err(e) => {
            eprintln!("iam-policy-autopilot-bootstrap: {e:#}");
            ExitCode::from(USAGE_ERROR)
        }
    }
}
