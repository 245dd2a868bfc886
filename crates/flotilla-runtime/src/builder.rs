//! Fluent API for assembling a [`Service`].

use std::sync::Arc;

use flotilla_common::constants::REFERENCE_SEPARATOR;
use flotilla_common::error::{FlotillaError, Result};
use serde_yaml::{Mapping, Value};

use crate::client::RuntimeClient;
use crate::service::{Service, ServiceLink, VolumeFrom};

/// Builder for a service whose references are already resolved.
#[derive(Debug)]
pub struct ServiceBuilder {
    name: String,
    project: String,
    client: Arc<dyn RuntimeClient>,
    links: Vec<ServiceLink>,
    volumes_from: Vec<VolumeFrom>,
    options: Mapping,
}

impl ServiceBuilder {
    /// Creates a builder for service `name` of `project`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        project: impl Into<String>,
        client: Arc<dyn RuntimeClient>,
    ) -> Self {
        Self {
            name: name.into(),
            project: project.into(),
            client,
            links: Vec::new(),
            volumes_from: Vec::new(),
            options: Mapping::new(),
        }
    }

    /// Adds a link to `service`, exposed under `alias` if given.
    #[must_use]
    pub fn link(mut self, service: Arc<Service>, alias: Option<&str>) -> Self {
        self.links
            .push(ServiceLink::new(service, alias.map(str::to_string)));
        self
    }

    /// Replaces the links.
    #[must_use]
    pub fn links(mut self, links: Vec<ServiceLink>) -> Self {
        self.links = links;
        self
    }

    /// Replaces the volumes-from mounts.
    #[must_use]
    pub fn volumes_from(mut self, volumes_from: Vec<VolumeFrom>) -> Self {
        self.volumes_from = volumes_from;
        self
    }

    /// Sets one pass-through option.
    #[must_use]
    pub fn option(mut self, key: &str, value: impl Into<Value>) -> Self {
        let _ = self.options.insert(Value::from(key), value.into());
        self
    }

    /// Replaces all pass-through options.
    #[must_use]
    pub fn options(mut self, options: Mapping) -> Self {
        self.options = options;
        self
    }

    /// Builds the service.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the name is empty or contains the
    /// reference separator `:`.
    pub fn build(self) -> Result<Service> {
        if self.name.is_empty() || self.name.contains(REFERENCE_SEPARATOR) {
            return Err(FlotillaError::config(format!(
                "invalid service name \"{}\"",
                self.name
            )));
        }
        Ok(Service {
            name: self.name,
            project: self.project,
            links: self.links,
            volumes_from: self.volumes_from,
            options: self.options,
            client: self.client,
        })
    }
}
