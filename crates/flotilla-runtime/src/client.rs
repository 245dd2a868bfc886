//! Container runtime abstraction.
//!
//! Everything the orchestration layer needs from a container engine goes
//! through [`RuntimeClient`]. Calls are synchronous and issued one at a
//! time in dependency order.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use flotilla_common::error::Result;
use flotilla_common::types::{ContainerId, ContainerState};

/// Configuration for creating a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Container name, `<project>_<service>_<n>` for managed containers.
    pub name: String,
    /// Image reference to run.
    pub image: String,
    /// Command override; empty keeps the image default.
    pub command: Vec<String>,
    /// Environment variables.
    pub environment: BTreeMap<String, String>,
    /// `(container, alias)` pairs the container is linked to.
    pub links: Vec<(String, String)>,
    /// Container IDs to mount volumes from, optionally suffixed `:ro`/`:rw`.
    pub volumes_from: Vec<String>,
    /// Whether the container runs detached from the caller's terminal.
    pub detach: bool,
}

/// Information about a container known to the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    /// Runtime identifier.
    pub id: ContainerId,
    /// Container name, without any leading `/`.
    pub name: String,
    /// Image the container was created from.
    pub image: String,
    /// Current state.
    pub state: ContainerState,
}

/// Options for stopping a container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StopOptions {
    /// Grace period before the runtime kills the container.
    pub timeout: Option<Duration>,
}

/// Options for removing a container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveOptions {
    /// Also remove anonymous volumes attached to the container.
    pub volumes: bool,
}

/// Options for pulling an image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PullOptions {
    /// Allow pulling from registries without valid TLS.
    pub insecure_registry: bool,
}

/// Options for building an image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Tag applied to the built image.
    pub tag: String,
    /// Ignore the build cache.
    pub no_cache: bool,
}

/// Synchronous container runtime.
///
/// Implementors report a missing container or image as
/// [`FlotillaError::NotFound`](flotilla_common::error::FlotillaError::NotFound)
/// with kind `"container"` or `"image"`, and any other failure as
/// [`FlotillaError::Runtime`](flotilla_common::error::FlotillaError::Runtime).
pub trait RuntimeClient: Send + Sync + std::fmt::Debug {
    /// Creates a container and returns its ID.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` with kind `"image"` if the image is not present
    /// locally, or a runtime error if creation fails.
    fn create_container(&self, spec: &ContainerSpec) -> Result<ContainerId>;

    /// Starts a created or stopped container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be started.
    fn start_container(&self, id: &ContainerId) -> Result<()>;

    /// Stops a running container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be stopped.
    fn stop_container(&self, id: &ContainerId, options: &StopOptions) -> Result<()>;

    /// Kills a running container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be killed.
    fn kill_container(&self, id: &ContainerId) -> Result<()>;

    /// Removes a stopped container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be removed.
    fn remove_container(&self, id: &ContainerId, options: &RemoveOptions) -> Result<()>;

    /// Lists containers, including stopped ones when `include_stopped`.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be queried.
    fn list_containers(&self, include_stopped: bool) -> Result<Vec<ContainerInfo>>;

    /// Pulls an image from its registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the pull fails.
    fn pull_image(&self, image: &str, options: &PullOptions) -> Result<()>;

    /// Builds an image from a local context directory and returns its ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the build fails.
    fn build_image(&self, context: &Path, options: &BuildOptions) -> Result<String>;

    /// Looks a container up by ID or name.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` with kind `"container"` if nothing matches.
    fn inspect_container(&self, id_or_name: &str) -> Result<ContainerInfo>;
}
