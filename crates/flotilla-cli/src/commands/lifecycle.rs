//! `flotilla start|stop|kill|restart|rm`: Lifecycle commands over existing
//! containers.

use std::time::Duration;

use clap::Args;
use flotilla_common::config::FlotillaConfig;
use flotilla_runtime::client::{RemoveOptions, StopOptions};
use flotilla_runtime::orchestrator::Orchestrator;

/// Arguments naming the services to act on.
#[derive(Args, Debug)]
pub struct ServiceArgs {
    /// Services to act on; all when empty.
    pub services: Vec<String>,
}

/// Arguments for `stop` and `restart`.
#[derive(Args, Debug)]
pub struct StopArgs {
    /// Services to act on; all when empty.
    pub services: Vec<String>,

    /// Seconds to wait for a container to stop before killing it.
    #[arg(short = 't', long)]
    pub timeout: Option<u64>,
}

impl StopArgs {
    fn options(&self, config: &FlotillaConfig) -> StopOptions {
        StopOptions {
            timeout: Some(Duration::from_secs(
                self.timeout.unwrap_or(config.stop_timeout_secs),
            )),
        }
    }
}

/// Arguments for `rm`.
#[derive(Args, Debug)]
pub struct RmArgs {
    /// Services whose stopped containers are removed; all when empty.
    pub services: Vec<String>,

    /// Also remove volumes attached to the containers.
    #[arg(short, long)]
    pub volumes: bool,
}

/// Starts existing containers.
///
/// # Errors
///
/// Returns an error if the project cannot be loaded or a start fails.
pub fn start(config: &FlotillaConfig, args: &ServiceArgs) -> anyhow::Result<()> {
    let project = super::load_project(config)?;
    Orchestrator::new(&project).start(&args.services)?;
    Ok(())
}

/// Stops running containers, dependents first.
///
/// # Errors
///
/// Returns an error if the project cannot be loaded or a stop fails.
pub fn stop(config: &FlotillaConfig, args: &StopArgs) -> anyhow::Result<()> {
    let project = super::load_project(config)?;
    Orchestrator::new(&project).stop(&args.services, &args.options(config))?;
    Ok(())
}

/// Kills running containers, dependents first.
///
/// # Errors
///
/// Returns an error if the project cannot be loaded or a kill fails.
pub fn kill(config: &FlotillaConfig, args: &ServiceArgs) -> anyhow::Result<()> {
    let project = super::load_project(config)?;
    Orchestrator::new(&project).kill(&args.services)?;
    Ok(())
}

/// Restarts containers.
///
/// # Errors
///
/// Returns an error if the project cannot be loaded or a restart fails.
pub fn restart(config: &FlotillaConfig, args: &StopArgs) -> anyhow::Result<()> {
    let project = super::load_project(config)?;
    Orchestrator::new(&project).restart(&args.services, &args.options(config))?;
    Ok(())
}

/// Removes stopped containers.
///
/// # Errors
///
/// Returns an error if the project cannot be loaded or a removal fails.
pub fn rm(config: &FlotillaConfig, args: &RmArgs) -> anyhow::Result<()> {
    let project = super::load_project(config)?;
    let options = RemoveOptions {
        volumes: args.volumes,
    };
    Orchestrator::new(&project).remove_stopped(&args.services, &options)?;
    Ok(())
}
