//! In-memory [`RuntimeClient`] for tests and dry runs.
//!
//! Tracks containers in a vector and records every mutating call, so the
//! order in which the orchestrator touches services can be asserted.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use flotilla_common::error::{FlotillaError, Result};
use flotilla_common::types::{ContainerId, ContainerState};

use crate::client::{
    BuildOptions, ContainerInfo, ContainerSpec, PullOptions, RemoveOptions, RuntimeClient,
    StopOptions,
};

/// A mutating call received by [`MemoryRuntime`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    /// A container was created from this spec.
    Create(ContainerSpec),
    /// A container was started.
    Start(ContainerId),
    /// A container was stopped.
    Stop(ContainerId),
    /// A container was killed.
    Kill(ContainerId),
    /// A container was removed.
    Remove(ContainerId),
    /// An image was pulled.
    Pull(String),
    /// An image was built.
    Build {
        /// Build context directory.
        context: PathBuf,
        /// Tag applied to the image.
        tag: String,
        /// Whether the cache was bypassed.
        no_cache: bool,
    },
}

#[derive(Debug, Default)]
struct MemoryState {
    containers: Vec<ContainerInfo>,
    calls: Vec<RuntimeCall>,
    images: HashSet<String>,
    next_id: u64,
}

/// Container runtime that lives entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryRuntime {
    state: Mutex<MemoryState>,
    strict_images: bool,
}

impl MemoryRuntime {
    /// Creates an empty runtime that accepts any image.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires images to be pulled or built before containers use them.
    #[must_use]
    pub fn strict_images(mut self) -> Self {
        self.strict_images = true;
        self
    }

    /// Seeds a container that already exists, e.g. one managed elsewhere.
    #[must_use]
    pub fn with_container(self, info: ContainerInfo) -> Self {
        self.lock().containers.push(info);
        self
    }

    /// Returns the mutating calls received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.lock().calls.clone()
    }

    /// Forgets the recorded calls, keeping containers and images.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MemoryState {
    fn find_mut(&mut self, id: &ContainerId) -> Result<&mut ContainerInfo> {
        self.containers
            .iter_mut()
            .find(|c| c.id == *id)
            .ok_or_else(|| FlotillaError::NotFound {
                kind: "container",
                id: id.to_string(),
            })
    }

    fn set_state(&mut self, id: &ContainerId, state: ContainerState) -> Result<()> {
        self.find_mut(id)?.state = state;
        Ok(())
    }
}

impl RuntimeClient for MemoryRuntime {
    fn create_container(&self, spec: &ContainerSpec) -> Result<ContainerId> {
        let mut state = self.lock();
        if self.strict_images && !state.images.contains(&spec.image) {
            return Err(FlotillaError::NotFound {
                kind: "image",
                id: spec.image.clone(),
            });
        }
        if state.containers.iter().any(|c| c.name == spec.name) {
            return Err(FlotillaError::Runtime {
                operation: "create",
                message: format!("container name \"{}\" is already in use", spec.name),
            });
        }

        state.next_id += 1;
        let id = ContainerId::new(format!("{:064x}", state.next_id));
        state.containers.push(ContainerInfo {
            id: id.clone(),
            name: spec.name.clone(),
            image: spec.image.clone(),
            state: ContainerState::Created,
        });
        state.calls.push(RuntimeCall::Create(spec.clone()));
        Ok(id)
    }

    fn start_container(&self, id: &ContainerId) -> Result<()> {
        let mut state = self.lock();
        state.set_state(id, ContainerState::Running)?;
        state.calls.push(RuntimeCall::Start(id.clone()));
        Ok(())
    }

    fn stop_container(&self, id: &ContainerId, _options: &StopOptions) -> Result<()> {
        let mut state = self.lock();
        state.set_state(id, ContainerState::Exited)?;
        state.calls.push(RuntimeCall::Stop(id.clone()));
        Ok(())
    }

    fn kill_container(&self, id: &ContainerId) -> Result<()> {
        let mut state = self.lock();
        state.set_state(id, ContainerState::Exited)?;
        state.calls.push(RuntimeCall::Kill(id.clone()));
        Ok(())
    }

    fn remove_container(&self, id: &ContainerId, _options: &RemoveOptions) -> Result<()> {
        let mut state = self.lock();
        if state.find_mut(id)?.state.is_running() {
            return Err(FlotillaError::Runtime {
                operation: "remove",
                message: format!("container {id} is running"),
            });
        }
        state.containers.retain(|c| c.id != *id);
        state.calls.push(RuntimeCall::Remove(id.clone()));
        Ok(())
    }

    fn list_containers(&self, include_stopped: bool) -> Result<Vec<ContainerInfo>> {
        Ok(self
            .lock()
            .containers
            .iter()
            .filter(|c| include_stopped || c.state.is_running())
            .cloned()
            .collect())
    }

    fn pull_image(&self, image: &str, _options: &PullOptions) -> Result<()> {
        let mut state = self.lock();
        let _ = state.images.insert(image.to_string());
        state.calls.push(RuntimeCall::Pull(image.to_string()));
        Ok(())
    }

    fn build_image(&self, context: &Path, options: &BuildOptions) -> Result<String> {
        let mut state = self.lock();
        let _ = state.images.insert(options.tag.clone());
        state.calls.push(RuntimeCall::Build {
            context: context.to_path_buf(),
            tag: options.tag.clone(),
            no_cache: options.no_cache,
        });
        Ok(format!("sha256:{}", options.tag))
    }

    fn inspect_container(&self, id_or_name: &str) -> Result<ContainerInfo> {
        self.lock()
            .containers
            .iter()
            .find(|c| c.id.as_str() == id_or_name || c.name == id_or_name)
            .cloned()
            .ok_or_else(|| FlotillaError::NotFound {
                kind: "container",
                id: id_or_name.to_string(),
            })
    }
}
