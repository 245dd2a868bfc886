//! `flotilla pull`: Pull service images.

use clap::Args;
use flotilla_common::config::FlotillaConfig;
use flotilla_runtime::orchestrator::Orchestrator;

/// Arguments for the `pull` command.
#[derive(Args, Debug)]
pub struct PullArgs {
    /// Services to pull, together with the services they link to; all when
    /// empty.
    pub services: Vec<String>,

    /// Allow registries without valid TLS.
    #[arg(long)]
    pub allow_insecure_ssl: bool,
}

/// Executes the `pull` command.
///
/// # Errors
///
/// Returns an error if the project cannot be loaded or a pull fails.
pub fn execute(config: &FlotillaConfig, args: &PullArgs) -> anyhow::Result<()> {
    let project = super::load_project(config)?;
    Orchestrator::new(&project).pull(&args.services, args.allow_insecure_ssl)?;
    Ok(())
}
