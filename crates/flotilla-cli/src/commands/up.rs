//! `flotilla up`: Create and start containers for services.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use clap::Args;
use flotilla_common::config::FlotillaConfig;
use flotilla_runtime::client::StopOptions;
use flotilla_runtime::container::Container;
use flotilla_runtime::orchestrator::{Orchestrator, UpOptions};

use crate::output::{BOLD, DIM, GREEN, RESET};

/// Arguments for the `up` command.
#[derive(Args, Debug)]
#[allow(clippy::struct_excessive_bools)]
pub struct UpArgs {
    /// Services to bring up; all when empty.
    pub services: Vec<String>,

    /// Run in detached mode (don't wait for Ctrl+C).
    #[arg(short, long)]
    pub detach: bool,

    /// Don't start linked services.
    #[arg(long)]
    pub no_deps: bool,

    /// Keep existing containers instead of recreating them.
    #[arg(long)]
    pub no_recreate: bool,

    /// Don't build images, even if they are missing.
    #[arg(long)]
    pub no_build: bool,

    /// Remove every container and start one new container per service.
    #[arg(long)]
    pub fresh: bool,

    /// Allow pulling missing images from registries without valid TLS.
    #[arg(long)]
    pub allow_insecure_ssl: bool,
}

impl UpArgs {
    const fn options(&self) -> UpOptions {
        UpOptions {
            start_links: !self.no_deps,
            recreate: !self.no_recreate,
            fresh_start: self.fresh,
            insecure_registry: self.allow_insecure_ssl,
            detach: self.detach,
            do_build: !self.no_build,
        }
    }
}

/// Executes the `up` command.
///
/// # Errors
///
/// Returns an error if the project cannot be loaded or a service fails to
/// come up.
pub fn execute(config: &FlotillaConfig, args: &UpArgs) -> anyhow::Result<()> {
    let started = Instant::now();
    let project = super::load_project(config)?;
    let orchestrator = Orchestrator::new(&project);

    let containers = orchestrator.up(&args.services, &args.options())?;
    report(&containers, started);

    if args.detach {
        eprintln!();
        eprintln!("  Running detached. Use {BOLD}flotilla stop{RESET} to stop the services.");
        return Ok(());
    }

    wait_for_interrupt()?;

    eprintln!();
    eprintln!("  Stopping services...");
    let options = StopOptions {
        timeout: Some(Duration::from_secs(config.stop_timeout_secs)),
    };
    orchestrator.stop(&args.services, &options)?;
    eprintln!("  {GREEN}All services stopped.{RESET}");
    Ok(())
}

fn report(containers: &[Container], started: Instant) {
    eprintln!();
    eprintln!(
        "  {GREEN}{BOLD}{}{RESET} container(s) running after {:.1}s:",
        containers.len(),
        started.elapsed().as_secs_f64()
    );
    for container in containers {
        eprintln!(
            "    {GREEN}●{RESET} {BOLD}{}{RESET} {DIM}[{}]{RESET}",
            container.name,
            container.id.short()
        );
    }
}

fn wait_for_interrupt() -> anyhow::Result<()> {
    eprintln!();
    eprintln!("  Press {BOLD}Ctrl+C{RESET} to stop the services...");

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {e}"))?;

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(250));
    }
    Ok(())
}
