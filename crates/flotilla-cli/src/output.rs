//! Formatted output helpers for CLI commands.

use flotilla_common::types::ContainerState;
use flotilla_runtime::container::Container;

pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const GREEN: &str = "\x1b[32m";
pub const RESET: &str = "\x1b[0m";

/// Renders containers as a fixed-width table, header first.
#[must_use]
pub fn container_table(containers: &[Container]) -> Vec<String> {
    let width = containers
        .iter()
        .map(|c| c.name.len())
        .max()
        .unwrap_or(0)
        .max("NAME".len());
    let mut lines = vec![format!(
        "{:<width$}   {:<12}   {:<10}   {}",
        "NAME", "ID", "STATE", "IMAGE"
    )];
    lines.extend(containers.iter().map(|c| {
        format!(
            "{:<width$}   {:<12}   {:<10}   {}",
            c.name,
            c.id.short(),
            state_label(c.state),
            c.image
        )
    }));
    lines
}

/// Short state word shown in `ps` output.
#[must_use]
pub const fn state_label(state: ContainerState) -> &'static str {
    match state {
        ContainerState::Running => "Up",
        ContainerState::Restarting => "Restarting",
        ContainerState::Paused => "Paused",
        ContainerState::Created | ContainerState::Exited | ContainerState::Dead => "Exit",
    }
}
