//! The service registry of one project.
//!
//! A [`Project`] holds its services in creation order: every service comes
//! after the services it links to or mounts volumes from. Lifecycle code
//! selects services only through [`Project::get_services`].

use std::collections::HashSet;
use std::sync::Arc;

use flotilla_common::constants::{MAX_LINK_DEPTH, NAME_SEPARATOR};
use flotilla_common::error::{FlotillaError, Result};
use flotilla_compose::declaration::{self, ServiceDeclaration};
use flotilla_compose::graph::sort_declarations;
use flotilla_compose::reference::Reference;
use serde_yaml::Mapping;

use crate::client::RuntimeClient;
use crate::container::Container;
use crate::service::{Service, ServiceLink, VolumeFrom, VolumeFromSource};

/// A named collection of services sharing one runtime client.
#[derive(Debug)]
pub struct Project {
    name: String,
    namespace: String,
    services: Vec<Arc<Service>>,
    client: Arc<dyn RuntimeClient>,
}

impl Project {
    /// Creates a project from already resolved services.
    ///
    /// `namespace` defaults to `name`.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        services: Vec<Arc<Service>>,
        client: Arc<dyn RuntimeClient>,
        namespace: Option<String>,
    ) -> Self {
        let name = name.into();
        Self {
            namespace: namespace.unwrap_or_else(|| name.clone()),
            name,
            services,
            client,
        }
    }

    /// Orders `declarations` by dependency and resolves each one against the
    /// services registered before it.
    ///
    /// # Errors
    ///
    /// Returns a dependency error if the declarations cannot be ordered, or
    /// a configuration error if a reference cannot be resolved.
    pub fn from_declarations(
        name: impl Into<String>,
        declarations: Vec<ServiceDeclaration>,
        client: Arc<dyn RuntimeClient>,
        namespace: Option<String>,
    ) -> Result<Self> {
        let mut project = Self::new(name, Vec::new(), client, namespace);
        for declaration in sort_declarations(declarations)? {
            let links = project.get_links(&declaration.links, &declaration.name)?;
            let volumes_from =
                project.get_volumes_from(&declaration.volumes_from, &declaration.name)?;
            let service = Service::builder(
                declaration.name,
                project.name.clone(),
                Arc::clone(&project.client),
            )
            .links(links)
            .volumes_from(volumes_from)
            .options(declaration.options)
            .build()?;
            project.services.push(Arc::new(service));
        }
        tracing::debug!(
            project = %project.name,
            services = project.services.len(),
            "project loaded"
        );
        Ok(project)
    }

    /// Builds a project from a configuration mapping of service name to
    /// service options.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if any entry is not a mapping, before
    /// any service is built, plus every error of
    /// [`Project::from_declarations`].
    pub fn from_config(
        name: impl Into<String>,
        config: &Mapping,
        client: Arc<dyn RuntimeClient>,
        namespace: Option<String>,
    ) -> Result<Self> {
        let declarations = declaration::from_config(config)?;
        Self::from_declarations(name, declarations, client, namespace)
    }

    /// Project name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Namespace of the top-level project; equals the name unless this
    /// project was included by another.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Runtime client shared by every service.
    #[must_use]
    pub fn client(&self) -> &Arc<dyn RuntimeClient> {
        &self.client
    }

    /// Every service, in creation order.
    #[must_use]
    pub fn services(&self) -> &[Arc<Service>] {
        &self.services
    }

    /// Looks a service up by name.
    ///
    /// `key` may carry a project prefix (`<project>_<service>`). A prefix
    /// that differs from the namespace is treated as relative to it.
    ///
    /// # Errors
    ///
    /// Returns [`FlotillaError::NoSuchService`] if nothing matches.
    pub fn get_service(&self, key: &str) -> Result<Arc<Service>> {
        let (project, short) = match key.rsplit_once(NAME_SEPARATOR) {
            Some((candidate, short)) if candidate == self.namespace => {
                (candidate.to_string(), short)
            }
            Some((candidate, short)) => (format!("{}{candidate}", self.namespace), short),
            None => (self.name.clone(), key),
        };

        if project == self.name {
            if let Some(service) = self.services.iter().find(|s| s.name() == short) {
                return Ok(Arc::clone(service));
            }
        }
        Err(FlotillaError::NoSuchService {
            name: key.to_string(),
        })
    }

    /// Selects services by name.
    ///
    /// An empty `names` selects every service in creation order. With
    /// `include_links`, each requested service is preceded by everything it
    /// transitively links to. Duplicates keep their first position.
    ///
    /// # Errors
    ///
    /// Returns [`FlotillaError::NoSuchService`] for an unknown name, or a
    /// dependency error if the links loop or nest deeper than
    /// [`MAX_LINK_DEPTH`].
    pub fn get_services<S: AsRef<str>>(
        &self,
        names: &[S],
        include_links: bool,
    ) -> Result<Vec<Arc<Service>>> {
        if names.is_empty() {
            return Ok(self.services.clone());
        }

        let requested = names
            .iter()
            .map(|name| self.get_service(name.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        let expanded = if include_links {
            link_closure(requested)?
        } else {
            requested
        };

        let mut seen = HashSet::new();
        Ok(expanded
            .into_iter()
            .filter(|service| seen.insert(service.full_name()))
            .collect())
    }

    /// Resolves `target[:alias]` link references declared by `owner`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a reference is malformed or names a
    /// service that is not registered (yet).
    pub fn get_links(&self, references: &[String], owner: &str) -> Result<Vec<ServiceLink>> {
        references
            .iter()
            .map(|raw| {
                let reference = Reference::parse(raw)?;
                let service = self.get_service(&reference.target).map_err(|_| {
                    FlotillaError::config(format!(
                        "service \"{owner}\" has a link to service \"{}\" which does not exist",
                        reference.target
                    ))
                })?;
                Ok(ServiceLink::new(service, reference.suffix))
            })
            .collect()
    }

    /// Resolves `target[:mode]` volumes-from references declared by `owner`.
    ///
    /// A registered service wins over a container with the same name;
    /// otherwise the target is looked up in the runtime.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a reference is malformed or its
    /// target is neither a service nor a container.
    pub fn get_volumes_from(&self, references: &[String], owner: &str) -> Result<Vec<VolumeFrom>> {
        references
            .iter()
            .map(|raw| {
                let reference = Reference::parse(raw)?;
                let source = match self.get_service(&reference.target) {
                    Ok(service) => VolumeFromSource::Service(service),
                    Err(_) => self
                        .client
                        .inspect_container(&reference.target)
                        .map(|info| VolumeFromSource::Container(Container::from_info(info)))
                        .map_err(|err| {
                            tracing::debug!(
                                reference = %raw,
                                error = %err,
                                "volume source lookup failed"
                            );
                            FlotillaError::config(format!(
                                "service \"{owner}\" mounts volumes from \"{}\", which is not \
                                 the name of a service or container",
                                reference.target
                            ))
                        })?,
                };
                Ok(VolumeFrom {
                    source,
                    mode: reference.suffix,
                })
            })
            .collect()
    }
}

/// Expands each service into its links, depth-first and in link order,
/// followed by the service itself. Services already emitted are skipped.
fn link_closure(requested: Vec<Arc<Service>>) -> Result<Vec<Arc<Service>>> {
    let mut output = Vec::new();
    let mut visited = HashSet::new();

    for root in requested {
        if visited.contains(&root.full_name()) {
            continue;
        }
        let mut stack = vec![frame(root)];
        while let Some((service, pending)) = stack.last_mut() {
            let Some(child) = pending.pop() else {
                if let Some((done, _)) = stack.pop() {
                    let _ = visited.insert(done.full_name());
                    output.push(done);
                }
                continue;
            };
            let parent = service.name().to_string();
            let key = child.full_name();
            if visited.contains(&key) {
                continue;
            }
            if stack.iter().any(|(s, _)| s.full_name() == key) {
                return Err(FlotillaError::dependency(format!(
                    "service \"{parent}\" links back to \"{}\"",
                    child.name()
                )));
            }
            if stack.len() >= MAX_LINK_DEPTH {
                return Err(FlotillaError::dependency(format!(
                    "links of service \"{}\" nest deeper than {MAX_LINK_DEPTH}",
                    child.name()
                )));
            }
            stack.push(frame(child));
        }
    }
    Ok(output)
}

/// A service with its links still to visit, last link on top.
fn frame(service: Arc<Service>) -> (Arc<Service>, Vec<Arc<Service>>) {
    let mut pending = service.linked_services();
    pending.reverse();
    (service, pending)
}

#[cfg(test)]
mod tests {
    use flotilla_common::types::{ContainerId, ContainerState};

    use super::*;
    use crate::client::ContainerInfo;
    use crate::memory::MemoryRuntime;

    fn client() -> Arc<dyn RuntimeClient> {
        Arc::new(MemoryRuntime::new())
    }

    fn service(name: &str) -> Arc<Service> {
        Arc::new(Service::builder(name, "flotillatest", client()).build().unwrap())
    }

    fn linked(name: &str, target: &Arc<Service>, alias: &str) -> Arc<Service> {
        Arc::new(
            Service::builder(name, "flotillatest", client())
                .link(Arc::clone(target), Some(alias))
                .build()
                .unwrap(),
        )
    }

    fn names(services: &[Arc<Service>]) -> Vec<&str> {
        services.iter().map(|s| s.name()).collect()
    }

    #[test]
    fn from_declarations_registers_every_service() {
        let project = Project::from_declarations(
            "flotillatest",
            vec![
                ServiceDeclaration::new("web").with_option("image", "busybox:latest"),
                ServiceDeclaration::new("db").with_option("image", "busybox:latest"),
            ],
            client(),
            None,
        )
        .unwrap();
        assert_eq!(project.services().len(), 2);
        let web = project.get_service("web").unwrap();
        assert_eq!(web.name(), "web");
        assert_eq!(web.options().get("image").and_then(|v| v.as_str()), Some("busybox:latest"));
        assert_eq!(project.get_service("db").unwrap().name(), "db");
    }

    #[test]
    fn from_declarations_sorts_in_dependency_order() {
        let project = Project::from_declarations(
            "flotillatest",
            vec![
                ServiceDeclaration::new("web")
                    .with_option("image", "busybox:latest")
                    .with_links(["db"]),
                ServiceDeclaration::new("db")
                    .with_option("image", "busybox:latest")
                    .with_volumes_from(["volume"]),
                ServiceDeclaration::new("volume").with_option("image", "busybox:latest"),
            ],
            client(),
            None,
        )
        .unwrap();
        assert_eq!(names(project.services()), vec!["volume", "db", "web"]);
        let db = project.get_service("db").unwrap();
        assert!(matches!(
            &db.volumes_from()[0].source,
            VolumeFromSource::Service(s) if s.name() == "volume"
        ));
    }

    #[test]
    fn from_config_reads_mapping() {
        let config: Mapping = serde_yaml::from_str(
            "web:\n  image: busybox:latest\ndb:\n  image: busybox:latest\n",
        )
        .unwrap();
        let project = Project::from_config("flotillatest", &config, client(), None).unwrap();
        assert_eq!(project.services().len(), 2);
        assert_eq!(project.namespace(), "flotillatest");
    }

    #[test]
    fn from_config_rejects_non_mapping_values() {
        let config: Mapping = serde_yaml::from_str("web: busybox:latest\n").unwrap();
        let err = Project::from_config("flotillatest", &config, client(), None).unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn get_service_by_plain_name() {
        let web = service("web");
        let project = Project::new("test", vec![Arc::clone(&web)], client(), None);
        assert_eq!(project.get_service("web").unwrap(), web);
    }

    #[test]
    fn get_service_with_project_prefix() {
        let web = service("web");
        let project = Project::new("test", vec![Arc::clone(&web)], client(), None);
        assert_eq!(project.get_service("test_web").unwrap(), web);
    }

    #[test]
    fn get_service_not_found() {
        let project = Project::new("test", vec![], client(), None);
        let err = project.get_service("not_found").unwrap_err();
        assert!(matches!(err, FlotillaError::NoSuchService { name } if name == "not_found"));
    }

    #[test]
    fn get_service_with_foreign_prefix_misses() {
        let project = Project::new("test", vec![service("web")], client(), None);
        assert!(project.get_service("other_web").is_err());
    }

    #[test]
    fn get_services_without_names_returns_all() {
        let project = Project::new("test", vec![service("web"), service("db")], client(), None);
        let all = project.get_services::<&str>(&[], false).unwrap();
        assert_eq!(names(&all), vec!["web", "db"]);
    }

    #[test]
    fn get_services_returns_listed_services() {
        let console = service("console");
        let project =
            Project::new("test", vec![service("web"), Arc::clone(&console)], client(), None);
        assert_eq!(project.get_services(&["console"], false).unwrap(), vec![console]);
    }

    #[test]
    fn get_services_with_include_links() {
        let db = service("db");
        let cache = service("cache");
        let web = linked("web", &db, "database");
        let console = linked("console", &web, "web");
        let project = Project::new("test", vec![web, db, cache, console], client(), None);
        let selected = project.get_services(&["console"], true).unwrap();
        assert_eq!(names(&selected), vec!["db", "web", "console"]);
    }

    #[test]
    fn get_services_removes_duplicates_following_links() {
        let db = service("db");
        let web = linked("web", &db, "database");
        let project = Project::new("test", vec![web, db], client(), None);
        let selected = project.get_services(&["web", "db"], true).unwrap();
        assert_eq!(names(&selected), vec!["db", "web"]);
    }

    #[test]
    fn get_services_removes_duplicates_without_links() {
        let project = Project::new("test", vec![service("web")], client(), None);
        let selected = project.get_services(&["web", "web"], false).unwrap();
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn get_services_unknown_name_fails() {
        let project = Project::new("test", vec![service("web")], client(), None);
        assert!(project.get_services(&["nope"], true).is_err());
    }

    #[test]
    fn get_links_keeps_order_and_aliases() {
        let db = service("db");
        let other = service("other");
        let project =
            Project::new("test", vec![Arc::clone(&db), Arc::clone(&other)], client(), None);
        let links = project
            .get_links(&["db".into(), "db:alias".into(), "other".into()], "test")
            .unwrap();
        assert_eq!(
            links,
            vec![
                ServiceLink::new(Arc::clone(&db), None),
                ServiceLink::new(db, Some("alias".into())),
                ServiceLink::new(other, None),
            ]
        );
    }

    #[test]
    fn get_links_without_links_is_empty() {
        let project = Project::new("test", vec![], client(), None);
        assert!(project.get_links(&[], "web").unwrap().is_empty());
    }

    #[test]
    fn get_links_to_unknown_service_fails() {
        let project = Project::new("test", vec![], client(), None);
        let err = project.get_links(&["db".into()], "web").unwrap_err();
        assert!(err.is_configuration_error());
        assert!(err.to_string().contains("\"web\" has a link to service \"db\""));
    }

    #[test]
    fn volumes_from_prefers_services() {
        let runtime = MemoryRuntime::new().with_container(ContainerInfo {
            id: ContainerId::new("container-vol"),
            name: "vol".into(),
            image: "busybox".into(),
            state: ContainerState::Exited,
        });
        let vol = service("vol");
        let project = Project::new("test", vec![vol], Arc::new(runtime), None);
        let volumes = project.get_volumes_from(&["vol:ro".into()], "web").unwrap();
        assert!(matches!(&volumes[0].source, VolumeFromSource::Service(s) if s.name() == "vol"));
        assert_eq!(volumes[0].mode.as_deref(), Some("ro"));
    }

    #[test]
    fn volumes_from_falls_back_to_container() {
        let runtime = MemoryRuntime::new().with_container(ContainerInfo {
            id: ContainerId::new("aabbcc"),
            name: "data".into(),
            image: "busybox".into(),
            state: ContainerState::Exited,
        });
        let project = Project::new("test", vec![], Arc::new(runtime), None);
        let volumes = project.get_volumes_from(&["aabbcc".into()], "web").unwrap();
        assert!(matches!(
            &volumes[0].source,
            VolumeFromSource::Container(c) if c.id.as_str() == "aabbcc"
        ));
        assert!(volumes[0].mode.is_none());
    }

    #[test]
    fn volumes_from_unknown_target_fails() {
        let project = Project::new("test", vec![], client(), None);
        let err = project.get_volumes_from(&["ghost".into()], "web").unwrap_err();
        assert!(err.is_configuration_error());
        assert!(err.to_string().contains("mounts volumes from \"ghost\""));
    }

    #[test]
    fn deep_link_chains_are_rejected() {
        let mut previous = service("s0");
        let mut all = vec![Arc::clone(&previous)];
        for i in 1..=MAX_LINK_DEPTH {
            previous = linked(&format!("s{i}"), &previous, "up");
            all.push(Arc::clone(&previous));
        }
        let last = previous.name().to_string();
        let project = Project::new("flotillatest", all, client(), None);
        let err = project.get_services(&[last.as_str()], true).unwrap_err();
        assert!(err.is_configuration_error());
    }
}
