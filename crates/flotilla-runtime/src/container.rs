//! Handle to a container created by (or known to) the runtime.

use flotilla_common::constants::NAME_SEPARATOR;
use flotilla_common::types::{ContainerId, ContainerState};

use crate::client::ContainerInfo;

/// A container as last reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    /// Runtime identifier.
    pub id: ContainerId,
    /// Container name.
    pub name: String,
    /// Image the container runs.
    pub image: String,
    /// State at the time the handle was produced.
    pub state: ContainerState,
}

impl Container {
    /// Wraps runtime listing or inspection output.
    #[must_use]
    pub fn from_info(info: ContainerInfo) -> Self {
        Self {
            id: info.id,
            name: info.name,
            image: info.image,
            state: info.state,
        }
    }

    /// Returns whether the container was running when observed.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Trailing instance number of a `<project>_<service>_<n>` name.
    #[must_use]
    pub fn number(&self) -> Option<u32> {
        self.name
            .rsplit_once(NAME_SEPARATOR)
            .and_then(|(_, n)| n.parse().ok())
    }

    /// The name with its leading `<project>_` segment removed.
    #[must_use]
    pub fn name_without_project(&self) -> &str {
        self.name
            .split_once(NAME_SEPARATOR)
            .map_or(self.name.as_str(), |(_, rest)| rest)
    }

    /// Returns a copy observed in `state`.
    #[must_use]
    pub fn with_state(mut self, state: ContainerState) -> Self {
        self.state = state;
        self
    }
}
