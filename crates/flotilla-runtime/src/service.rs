//! A resolved service and its container operations.
//!
//! Containers belonging to a service are recognised by name:
//! `<project>_<service>_<n>` for regular instances and
//! `<project>_<service>_run_<n>` for one-off containers.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use flotilla_common::constants::{NAME_SEPARATOR, ONE_OFF_MARKER};
use flotilla_common::error::{FlotillaError, Result};
use flotilla_common::types::{ContainerId, ContainerState};
use serde_yaml::{Mapping, Value};

use crate::builder::ServiceBuilder;
use crate::client::{
    BuildOptions, ContainerInfo, ContainerSpec, PullOptions, RemoveOptions, RuntimeClient,
    StopOptions,
};
use crate::container::Container;

/// A link from one service to another.
#[derive(Debug, Clone)]
pub struct ServiceLink {
    /// The linked service.
    pub service: Arc<Service>,
    /// Name the target is exposed under; defaults to the target's name.
    pub alias: Option<String>,
}

impl ServiceLink {
    /// Creates a link to `service`.
    #[must_use]
    pub fn new(service: Arc<Service>, alias: Option<String>) -> Self {
        Self { service, alias }
    }

    /// Alias the linked service is exposed under.
    #[must_use]
    pub fn alias_or_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.service.name)
    }
}

impl PartialEq for ServiceLink {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.service, &other.service) && self.alias == other.alias
    }
}

impl Eq for ServiceLink {}

/// Where a service mounts volumes from.
#[derive(Debug, Clone)]
pub enum VolumeFromSource {
    /// Another service of the same project.
    Service(Arc<Service>),
    /// A container this project does not manage.
    Container(Container),
}

/// A volumes-from mount with its optional access mode.
#[derive(Debug, Clone)]
pub struct VolumeFrom {
    /// Mount source.
    pub source: VolumeFromSource,
    /// Access mode such as `ro` or `rw`.
    pub mode: Option<String>,
}

/// Options shared by the container creation strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateOptions {
    /// Allow pulling from registries without valid TLS.
    pub insecure_registry: bool,
    /// Create containers detached from the terminal.
    pub detach: bool,
    /// Build buildable services before creating their containers.
    pub do_build: bool,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            insecure_registry: false,
            detach: false,
            do_build: true,
        }
    }
}

/// A service of a project, with its references resolved.
pub struct Service {
    pub(crate) name: String,
    pub(crate) project: String,
    pub(crate) links: Vec<ServiceLink>,
    pub(crate) volumes_from: Vec<VolumeFrom>,
    pub(crate) options: Mapping,
    pub(crate) client: Arc<dyn RuntimeClient>,
}

impl Service {
    /// Starts building a service of `project`.
    pub fn builder(
        name: impl Into<String>,
        project: impl Into<String>,
        client: Arc<dyn RuntimeClient>,
    ) -> ServiceBuilder {
        ServiceBuilder::new(name, project, client)
    }

    /// Service name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the project the service belongs to.
    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    /// `<project>_<service>`, unique across projects.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}{NAME_SEPARATOR}{}", self.project, self.name)
    }

    /// Resolved links, in declaration order.
    #[must_use]
    pub fn links(&self) -> &[ServiceLink] {
        &self.links
    }

    /// Resolved volumes-from mounts, in declaration order.
    #[must_use]
    pub fn volumes_from(&self) -> &[VolumeFrom] {
        &self.volumes_from
    }

    /// Pass-through configuration options.
    #[must_use]
    pub const fn options(&self) -> &Mapping {
        &self.options
    }

    /// Services this one links to, in declaration order.
    #[must_use]
    pub fn linked_services(&self) -> Vec<Arc<Self>> {
        self.links.iter().map(|l| Arc::clone(&l.service)).collect()
    }

    /// Returns whether the service declares a local build context.
    #[must_use]
    pub fn can_be_built(&self) -> bool {
        self.options.contains_key("build")
    }

    fn build_context(&self) -> Option<PathBuf> {
        self.options
            .get("build")
            .and_then(Value::as_str)
            .map(PathBuf::from)
    }

    /// Image containers of this service run.
    ///
    /// Buildable services run the image tagged `<project>_<service>`.
    #[must_use]
    pub fn image_name(&self) -> Option<String> {
        if self.can_be_built() {
            Some(self.full_name())
        } else {
            self.options
                .get("image")
                .and_then(Value::as_str)
                .map(str::to_string)
        }
    }

    /// Returns whether `info` names a container of this service.
    #[must_use]
    pub fn has_container(&self, info: &ContainerInfo, one_off: bool) -> bool {
        let name = info.name.trim_start_matches('/');
        let prefix = format!("{}{NAME_SEPARATOR}", self.full_name());
        let Some(rest) = name.strip_prefix(&prefix) else {
            return false;
        };
        let number = if one_off {
            match rest
                .strip_prefix(ONE_OFF_MARKER)
                .and_then(|r| r.strip_prefix(NAME_SEPARATOR))
            {
                Some(number) => number,
                None => return false,
            }
        } else {
            rest
        };
        !number.is_empty() && number.bytes().all(|b| b.is_ascii_digit())
    }

    /// Containers of this service known to the runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot list containers.
    pub fn containers(&self, stopped: bool, one_off: bool) -> Result<Vec<Container>> {
        Ok(self
            .client
            .list_containers(stopped)?
            .into_iter()
            .filter(|info| self.has_container(info, one_off))
            .map(Container::from_info)
            .collect())
    }

    /// Builds the service image.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the service has no build context,
    /// or the runtime error if the build fails.
    pub fn build(&self, no_cache: bool) -> Result<String> {
        let context = self.build_context().ok_or_else(|| {
            FlotillaError::config(format!(
                "service \"{}\" has no build context",
                self.name
            ))
        })?;
        tracing::info!(service = %self.name, context = %context.display(), "building");
        let options = BuildOptions {
            tag: self.full_name(),
            no_cache,
        };
        self.client.build_image(&context, &options)
    }

    /// Starts every stopped container of the service.
    ///
    /// # Errors
    ///
    /// Returns the first runtime error encountered.
    pub fn start(&self) -> Result<()> {
        for container in self.containers(true, false)? {
            if !container.is_running() {
                let _ = self.start_container(container)?;
            }
        }
        Ok(())
    }

    /// Stops every running container of the service.
    ///
    /// # Errors
    ///
    /// Returns the first runtime error encountered.
    pub fn stop(&self, options: &StopOptions) -> Result<()> {
        for container in self.containers(false, false)? {
            tracing::info!(container = %container.name, "stopping");
            self.client.stop_container(&container.id, options)?;
        }
        Ok(())
    }

    /// Kills every running container of the service.
    ///
    /// # Errors
    ///
    /// Returns the first runtime error encountered.
    pub fn kill(&self) -> Result<()> {
        for container in self.containers(false, false)? {
            tracing::info!(container = %container.name, "killing");
            self.client.kill_container(&container.id)?;
        }
        Ok(())
    }

    /// Stops running containers, then starts every container of the service.
    ///
    /// # Errors
    ///
    /// Returns the first runtime error encountered.
    pub fn restart(&self, options: &StopOptions) -> Result<()> {
        for container in self.containers(true, false)? {
            tracing::info!(container = %container.name, "restarting");
            if container.is_running() {
                self.client.stop_container(&container.id, options)?;
            }
            self.client.start_container(&container.id)?;
        }
        Ok(())
    }

    /// Removes every stopped container of the service and returns how many.
    ///
    /// # Errors
    ///
    /// Returns the first runtime error encountered.
    pub fn remove_stopped(&self, options: &RemoveOptions) -> Result<usize> {
        let mut removed = 0;
        for container in self.containers(true, false)? {
            if !container.is_running() {
                tracing::info!(container = %container.name, "removing");
                self.client.remove_container(&container.id, options)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Pulls the service image. Returns `false` when there is nothing to
    /// pull because the image is built locally or not declared.
    ///
    /// # Errors
    ///
    /// Returns the runtime error if the pull fails.
    pub fn pull(&self, options: &PullOptions) -> Result<bool> {
        if self.can_be_built() {
            return Ok(false);
        }
        let Some(image) = self.image_name() else {
            return Ok(false);
        };
        tracing::info!(service = %self.name, image = %image, "pulling");
        self.client.pull_image(&image, options)?;
        Ok(true)
    }

    /// Creates a new container with the next free number.
    ///
    /// # Errors
    ///
    /// Returns an error if the service has no image, the build fails, or
    /// the runtime rejects the container.
    pub fn create_container(&self, options: &CreateOptions, one_off: bool) -> Result<Container> {
        let number = self.next_number(one_off)?;
        self.create_numbered(options, number, one_off)
    }

    /// Removes all containers of the service and starts a single new one.
    ///
    /// # Errors
    ///
    /// Returns the first runtime error encountered.
    pub fn fresh_start(&self, options: &CreateOptions) -> Result<Vec<Container>> {
        for container in self.containers(true, false)? {
            self.discard(&container)?;
        }
        let container = self.create_container(options, false)?;
        Ok(vec![self.start_container(container)?])
    }

    /// Replaces every container of the service, keeping instance numbers.
    ///
    /// Creates one container if the service has none.
    ///
    /// # Errors
    ///
    /// Returns the first runtime error encountered.
    pub fn recreate_containers(&self, options: &CreateOptions) -> Result<Vec<Container>> {
        let existing = self.containers(true, false)?;
        if existing.is_empty() {
            let container = self.create_container(options, false)?;
            return Ok(vec![self.start_container(container)?]);
        }

        let mut running = Vec::with_capacity(existing.len());
        for container in existing {
            let number = match container.number() {
                Some(n) => n,
                None => self.next_number(false)?,
            };
            tracing::info!(container = %container.name, "recreating");
            self.discard(&container)?;
            let replacement = self.create_numbered(options, number, false)?;
            running.push(self.start_container(replacement)?);
        }
        Ok(running)
    }

    /// Starts existing containers, or creates one if there are none.
    ///
    /// # Errors
    ///
    /// Returns the first runtime error encountered.
    pub fn start_or_create_containers(&self, options: &CreateOptions) -> Result<Vec<Container>> {
        let existing = self.containers(true, false)?;
        if existing.is_empty() {
            let container = self.create_container(options, false)?;
            return Ok(vec![self.start_container(container)?]);
        }

        existing
            .into_iter()
            .map(|container| {
                if container.is_running() {
                    Ok(container)
                } else {
                    self.start_container(container)
                }
            })
            .collect()
    }

    fn start_container(&self, container: Container) -> Result<Container> {
        tracing::info!(container = %container.name, "starting");
        self.client.start_container(&container.id)?;
        Ok(container.with_state(ContainerState::Running))
    }

    fn discard(&self, container: &Container) -> Result<()> {
        if container.is_running() {
            self.client
                .stop_container(&container.id, &StopOptions::default())?;
        }
        self.client
            .remove_container(&container.id, &RemoveOptions::default())
    }

    fn next_number(&self, one_off: bool) -> Result<u32> {
        let highest = self
            .containers(true, one_off)?
            .iter()
            .filter_map(Container::number)
            .max()
            .unwrap_or(0);
        highest.checked_add(1).ok_or_else(|| {
            FlotillaError::config(format!(
                "service \"{}\" has no container numbers left after {highest}",
                self.name
            ))
        })
    }

    fn container_name(&self, number: u32, one_off: bool) -> String {
        if one_off {
            format!(
                "{}{NAME_SEPARATOR}{ONE_OFF_MARKER}{NAME_SEPARATOR}{number}",
                self.full_name()
            )
        } else {
            format!("{}{NAME_SEPARATOR}{number}", self.full_name())
        }
    }

    fn create_numbered(
        &self,
        options: &CreateOptions,
        number: u32,
        one_off: bool,
    ) -> Result<Container> {
        if self.can_be_built() && options.do_build {
            let _ = self.build(false)?;
        }
        let image = self.image_name().ok_or_else(|| {
            FlotillaError::config(format!(
                "service \"{}\" has neither an image nor a build context",
                self.name
            ))
        })?;

        let spec = ContainerSpec {
            name: self.container_name(number, one_off),
            image,
            command: self.command(),
            environment: self.environment()?,
            links: self.link_pairs()?,
            volumes_from: self.volume_sources()?,
            detach: options.detach,
        };

        tracing::info!(container = %spec.name, "creating");
        let id = match self.client.create_container(&spec) {
            Err(err) if err.is_not_found("image") => {
                tracing::info!(image = %spec.image, "image not found locally, pulling");
                let pull = PullOptions {
                    insecure_registry: options.insecure_registry,
                };
                self.client.pull_image(&spec.image, &pull)?;
                self.client.create_container(&spec)?
            }
            other => other?,
        };

        Ok(Container {
            id,
            name: spec.name,
            image: spec.image,
            state: ContainerState::Created,
        })
    }

    /// `(container, alias)` pairs for every running container of every link.
    fn link_pairs(&self) -> Result<Vec<(String, String)>> {
        let mut pairs = Vec::new();
        for link in &self.links {
            let alias = link.alias_or_name();
            for container in link.service.containers(false, false)? {
                pairs.push((container.name.clone(), alias.to_string()));
                pairs.push((container.name.clone(), container.name.clone()));
                pairs.push((
                    container.name.clone(),
                    container.name_without_project().to_string(),
                ));
            }
        }
        Ok(pairs)
    }

    fn volume_sources(&self) -> Result<Vec<String>> {
        let mut sources = Vec::new();
        for volume in &self.volumes_from {
            let ids: Vec<ContainerId> = match &volume.source {
                VolumeFromSource::Service(service) => service
                    .containers(true, false)?
                    .into_iter()
                    .map(|c| c.id)
                    .collect(),
                VolumeFromSource::Container(container) => vec![container.id.clone()],
            };
            sources.extend(ids.into_iter().map(|id| match &volume.mode {
                Some(mode) => format!("{id}:{mode}"),
                None => id.to_string(),
            }));
        }
        Ok(sources)
    }

    fn command(&self) -> Vec<String> {
        match self.options.get("command") {
            Some(Value::String(cmd)) => cmd.split_whitespace().map(str::to_string).collect(),
            Some(Value::Sequence(parts)) => parts
                .iter()
                .filter_map(scalar_to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    fn environment(&self) -> Result<BTreeMap<String, String>> {
        let mut env = BTreeMap::new();
        match self.options.get("environment") {
            None | Some(Value::Null) => {}
            Some(Value::Mapping(vars)) => {
                for (key, value) in vars {
                    let (Some(key), Some(value)) = (key.as_str(), scalar_to_string(value)) else {
                        return Err(self.bad_environment());
                    };
                    let _ = env.insert(key.to_string(), value);
                }
            }
            Some(Value::Sequence(vars)) => {
                for var in vars {
                    let Some(var) = var.as_str() else {
                        return Err(self.bad_environment());
                    };
                    let (key, value) = var.split_once('=').unwrap_or((var, ""));
                    let _ = env.insert(key.to_string(), value.to_string());
                }
            }
            Some(_) => return Err(self.bad_environment()),
        }
        Ok(env)
    }

    fn bad_environment(&self) -> FlotillaError {
        FlotillaError::config(format!(
            "service \"{}\" has an invalid environment; use a mapping or a list of KEY=VALUE",
            self.name
        ))
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}

impl PartialEq for Service {
    fn eq(&self, other: &Self) -> bool {
        self.project == other.project && self.name == other.name
    }
}

impl Eq for Service {}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let links: Vec<String> = self
            .links
            .iter()
            .map(|l| format!("{}:{}", l.service.name, l.alias_or_name()))
            .collect();
        f.debug_struct("Service")
            .field("project", &self.project)
            .field("name", &self.name)
            .field("links", &links)
            .field("volumes_from", &self.volumes_from.len())
            .finish_non_exhaustive()
    }
}
