//! CLI command definitions and dispatch.

pub mod build;
pub mod lifecycle;
pub mod plan;
pub mod ps;
pub mod pull;
pub mod up;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use flotilla_common::config::{FlotillaConfig, load_services};
use flotilla_common::constants::{
    BIN_NAME, DEFAULT_CONFIG_FILE, DEFAULT_STOP_TIMEOUT_SECS, PROJECT_NAME_ENV,
};
use flotilla_runtime::docker::DockerClient;
use flotilla_runtime::project::Project;

/// Flotilla: run multi-container projects in dependency order.
#[derive(Parser, Debug)]
#[command(name = BIN_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Path to the service configuration file.
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub file: PathBuf,

    /// Project name; defaults to the directory holding the file.
    #[arg(short = 'p', long, global = true, env = PROJECT_NAME_ENV)]
    pub project_name: Option<String>,
}

impl Cli {
    fn config(&self) -> FlotillaConfig {
        FlotillaConfig {
            file: self.file.clone(),
            project_name: self.project_name.clone(),
            stop_timeout_secs: DEFAULT_STOP_TIMEOUT_SECS,
        }
    }
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create and start containers for services.
    Up(up::UpArgs),
    /// Start existing containers.
    Start(lifecycle::ServiceArgs),
    /// Stop running containers without removing them.
    Stop(lifecycle::StopArgs),
    /// Force stop running containers.
    Kill(lifecycle::ServiceArgs),
    /// Restart containers.
    Restart(lifecycle::StopArgs),
    /// Remove stopped containers.
    Rm(lifecycle::RmArgs),
    /// Build or rebuild service images.
    Build(build::BuildArgs),
    /// Pull service images.
    Pull(pull::PullArgs),
    /// List containers.
    Ps(ps::PsArgs),
    /// Show the order services would be brought up in.
    Plan(plan::PlanArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = cli.config();
    match cli.command {
        Command::Up(args) => up::execute(&config, &args),
        Command::Start(args) => lifecycle::start(&config, &args),
        Command::Stop(args) => lifecycle::stop(&config, &args),
        Command::Kill(args) => lifecycle::kill(&config, &args),
        Command::Restart(args) => lifecycle::restart(&config, &args),
        Command::Rm(args) => lifecycle::rm(&config, &args),
        Command::Build(args) => build::execute(&config, &args),
        Command::Pull(args) => pull::execute(&config, &args),
        Command::Ps(args) => ps::execute(&config, &args),
        Command::Plan(args) => plan::execute(&config, &args),
    }
}

/// Loads the service file and resolves it into a project backed by the
/// local Docker daemon.
///
/// # Errors
///
/// Returns an error if the daemon connection cannot be set up, the file
/// cannot be read, or the services cannot be resolved.
pub fn load_project(config: &FlotillaConfig) -> anyhow::Result<Project> {
    let client = DockerClient::connect()?;
    let services = load_services(&config.file)
        .with_context(|| format!("cannot load {}", config.file.display()))?;
    let name = config.resolved_project_name();
    tracing::debug!(project = %name, file = %config.file.display(), "loading project");
    let project = Project::from_config(name, &services, Arc::new(client), None)?;
    Ok(project)
}
