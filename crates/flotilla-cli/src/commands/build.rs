//! `flotilla build`: Build or rebuild service images.

use clap::Args;
use flotilla_common::config::FlotillaConfig;
use flotilla_runtime::orchestrator::Orchestrator;

/// Arguments for the `build` command.
#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Services to build; all when empty.
    pub services: Vec<String>,

    /// Do not use the build cache.
    #[arg(long)]
    pub no_cache: bool,
}

/// Executes the `build` command.
///
/// Services that run a prebuilt image are skipped.
///
/// # Errors
///
/// Returns an error if the project cannot be loaded or a build fails.
pub fn execute(config: &FlotillaConfig, args: &BuildArgs) -> anyhow::Result<()> {
    let project = super::load_project(config)?;
    Orchestrator::new(&project).build(&args.services, args.no_cache)?;
    Ok(())
}
