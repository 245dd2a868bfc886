//! `flotilla ps`: List containers of the project.

use clap::Args;
use flotilla_common::config::FlotillaConfig;
use flotilla_runtime::orchestrator::Orchestrator;

use crate::output::container_table;

/// Arguments for the `ps` command.
#[derive(Args, Debug)]
pub struct PsArgs {
    /// Services to list; all when empty.
    pub services: Vec<String>,

    /// Show stopped containers too.
    #[arg(short, long)]
    pub all: bool,

    /// Only display container IDs.
    #[arg(short, long)]
    pub quiet: bool,
}

/// Executes the `ps` command.
///
/// Lists regular containers followed by one-off containers.
///
/// # Errors
///
/// Returns an error if the project cannot be loaded or the runtime cannot
/// list containers.
pub fn execute(config: &FlotillaConfig, args: &PsArgs) -> anyhow::Result<()> {
    let project = super::load_project(config)?;
    let orchestrator = Orchestrator::new(&project);
    let mut containers = orchestrator.containers(&args.services, args.all, false)?;
    containers.extend(orchestrator.containers(&args.services, args.all, true)?);

    if args.quiet {
        for container in &containers {
            println!("{}", container.id);
        }
        return Ok(());
    }

    if containers.is_empty() {
        println!("No containers found.");
        return Ok(());
    }
    for line in container_table(&containers) {
        println!("{line}");
    }
    Ok(())
}
