//! `flotilla plan`: Show the order services would be brought up in.

use clap::Args;
use flotilla_common::config::{FlotillaConfig, load_services};
use flotilla_compose::declaration::{self, ServiceDeclaration};
use flotilla_compose::graph::sort_declarations;
use serde_yaml::Value;

/// Arguments for the `plan` command.
#[derive(Args, Debug)]
pub struct PlanArgs {}

/// Executes the `plan` command.
///
/// Orders the declared services without contacting the runtime, so it
/// also works as a configuration check.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the services cannot be
/// ordered.
pub fn execute(config: &FlotillaConfig, _args: &PlanArgs) -> anyhow::Result<()> {
    let services = load_services(&config.file)?;
    let ordered = sort_declarations(declaration::from_config(&services)?)?;

    println!(
        "Plan for project {} ({})",
        config.resolved_project_name(),
        config.file.display()
    );
    println!("{}", "\u{2550}".repeat(40));
    println!();
    for line in render(&ordered) {
        println!("{line}");
    }
    println!();
    println!("  {} service(s) will be brought up in this order.", ordered.len());
    Ok(())
}

fn render(ordered: &[ServiceDeclaration]) -> Vec<String> {
    let mut lines = Vec::new();
    for (step, service) in ordered.iter().enumerate() {
        lines.push(format!("  {}. {}", step + 1, service.name));
        if let Some(context) = service.options.get("build").and_then(Value::as_str) {
            lines.push(format!("      build: {context}"));
        } else if let Some(image) = service.options.get("image").and_then(Value::as_str) {
            lines.push(format!("      image: {image}"));
        }
        if !service.links.is_empty() {
            lines.push(format!("      links: {}", service.links.join(", ")));
        }
        if !service.volumes_from.is_empty() {
            lines.push(format!("      volumes_from: {}", service.volumes_from.join(", ")));
        }
    }
    lines
}
