//! Lifecycle operations over the services of a [`Project`].
//!
//! Operations that bring services up walk creation order; operations that
//! take them down walk it backwards. Every completed per-service step is
//! reported to the orchestrator's [`EventSink`].

use std::sync::Arc;

use flotilla_common::error::Result;

use crate::client::{PullOptions, RemoveOptions, StopOptions};
use crate::container::Container;
use crate::events::{EventSink, LifecycleEvent, TracingSink};
use crate::project::Project;
use crate::service::{CreateOptions, Service};

/// Options for [`Orchestrator::up`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct UpOptions {
    /// Also bring up everything the named services link to.
    pub start_links: bool,
    /// Replace existing containers.
    pub recreate: bool,
    /// Remove every container and start a single new one per service.
    pub fresh_start: bool,
    /// Allow pulling from registries without valid TLS.
    pub insecure_registry: bool,
    /// Create containers detached from the terminal.
    pub detach: bool,
    /// Build buildable services before creating containers.
    pub do_build: bool,
}

impl Default for UpOptions {
    fn default() -> Self {
        Self {
            start_links: true,
            recreate: true,
            fresh_start: false,
            insecure_registry: false,
            detach: false,
            do_build: true,
        }
    }
}

impl UpOptions {
    const fn create_options(&self) -> CreateOptions {
        CreateOptions {
            insecure_registry: self.insecure_registry,
            detach: self.detach,
            do_build: self.do_build,
        }
    }
}

/// How `up` obtains running containers for a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateStrategy {
    /// Discard all containers and start one new container.
    FreshStart,
    /// Replace every container, keeping instance numbers.
    Recreate,
    /// Start what exists, create only when nothing does.
    StartOrCreate,
}

impl CreateStrategy {
    /// Picks the strategy `options` ask for; `fresh_start` wins over
    /// `recreate`.
    #[must_use]
    pub const fn select(options: &UpOptions) -> Self {
        if options.fresh_start {
            Self::FreshStart
        } else if options.recreate {
            Self::Recreate
        } else {
            Self::StartOrCreate
        }
    }

    /// Applies the strategy to one service.
    ///
    /// # Errors
    ///
    /// Returns the first error the service reports.
    pub fn apply(self, service: &Service, options: &CreateOptions) -> Result<Vec<Container>> {
        let create: fn(&Service, &CreateOptions) -> Result<Vec<Container>> = match self {
            Self::FreshStart => Service::fresh_start,
            Self::Recreate => Service::recreate_containers,
            Self::StartOrCreate => Service::start_or_create_containers,
        };
        create(service, options)
    }
}

/// Drives lifecycle operations for one project.
pub struct Orchestrator<'p> {
    project: &'p Project,
    events: Arc<dyn EventSink>,
}

impl<'p> Orchestrator<'p> {
    /// Creates an orchestrator that logs events through `tracing`.
    #[must_use]
    pub fn new(project: &'p Project) -> Self {
        Self::with_events(project, Arc::new(TracingSink))
    }

    /// Creates an orchestrator that reports events to `events`.
    #[must_use]
    pub fn with_events(project: &'p Project, events: Arc<dyn EventSink>) -> Self {
        Self { project, events }
    }

    /// The project being orchestrated.
    #[must_use]
    pub const fn project(&self) -> &'p Project {
        self.project
    }

    /// Starts stopped containers of the named services (all if empty).
    ///
    /// # Errors
    ///
    /// Returns an error if a name is unknown or the runtime fails.
    pub fn start<S: AsRef<str>>(&self, names: &[S]) -> Result<()> {
        for service in self.project.get_services(names, false)? {
            service.start()?;
            self.emit(LifecycleEvent::Started {
                service: service.name().to_string(),
            });
        }
        Ok(())
    }

    /// Stops running containers, dependents first.
    ///
    /// # Errors
    ///
    /// Returns an error if a name is unknown or the runtime fails.
    pub fn stop<S: AsRef<str>>(&self, names: &[S], options: &StopOptions) -> Result<()> {
        for service in self.project.get_services(names, false)?.iter().rev() {
            service.stop(options)?;
            self.emit(LifecycleEvent::Stopped {
                service: service.name().to_string(),
            });
        }
        Ok(())
    }

    /// Kills running containers, dependents first.
    ///
    /// # Errors
    ///
    /// Returns an error if a name is unknown or the runtime fails.
    pub fn kill<S: AsRef<str>>(&self, names: &[S]) -> Result<()> {
        for service in self.project.get_services(names, false)?.iter().rev() {
            service.kill()?;
            self.emit(LifecycleEvent::Killed {
                service: service.name().to_string(),
            });
        }
        Ok(())
    }

    /// Restarts containers of the named services.
    ///
    /// # Errors
    ///
    /// Returns an error if a name is unknown or the runtime fails.
    pub fn restart<S: AsRef<str>>(&self, names: &[S], options: &StopOptions) -> Result<()> {
        for service in self.project.get_services(names, false)? {
            service.restart(options)?;
            self.emit(LifecycleEvent::Restarted {
                service: service.name().to_string(),
            });
        }
        Ok(())
    }

    /// Builds every buildable service; image-based services are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if a name is unknown or a build fails.
    pub fn build<S: AsRef<str>>(&self, names: &[S], no_cache: bool) -> Result<()> {
        for service in self.project.get_services(names, false)? {
            let name = service.name().to_string();
            if service.can_be_built() {
                let image = service.build(no_cache)?;
                self.emit(LifecycleEvent::Built {
                    service: name,
                    image,
                });
            } else {
                self.emit(LifecycleEvent::BuildSkipped { service: name });
            }
        }
        Ok(())
    }

    /// Brings the named services up and returns their running containers.
    ///
    /// # Errors
    ///
    /// Returns an error if a name is unknown, the links cannot be expanded,
    /// or a service fails to come up.
    pub fn up<S: AsRef<str>>(&self, names: &[S], options: &UpOptions) -> Result<Vec<Container>> {
        let strategy = CreateStrategy::select(options);
        let create = options.create_options();
        tracing::debug!(?strategy, project = %self.project.name(), "up");

        let mut running = Vec::new();
        for service in self.project.get_services(names, options.start_links)? {
            let containers = strategy.apply(&service, &create)?;
            self.emit(LifecycleEvent::Up {
                service: service.name().to_string(),
                containers: containers.iter().map(|c| c.id.clone()).collect(),
            });
            running.extend(containers);
        }
        Ok(running)
    }

    /// Pulls images of the named services and everything they link to.
    ///
    /// # Errors
    ///
    /// Returns an error if a name is unknown or a pull fails.
    pub fn pull<S: AsRef<str>>(&self, names: &[S], insecure_registry: bool) -> Result<()> {
        let options = PullOptions { insecure_registry };
        for service in self.project.get_services(names, true)? {
            let service_name = service.name().to_string();
            if service.pull(&options)? {
                self.emit(LifecycleEvent::Pulled {
                    service: service_name,
                });
            } else {
                self.emit(LifecycleEvent::PullSkipped {
                    service: service_name,
                    builds_locally: service.can_be_built(),
                });
            }
        }
        Ok(())
    }

    /// Removes stopped containers of the named services.
    ///
    /// # Errors
    ///
    /// Returns an error if a name is unknown or a removal fails.
    pub fn remove_stopped<S: AsRef<str>>(
        &self,
        names: &[S],
        options: &RemoveOptions,
    ) -> Result<()> {
        for service in self.project.get_services(names, false)? {
            let count = service.remove_stopped(options)?;
            self.emit(LifecycleEvent::RemovedStopped {
                service: service.name().to_string(),
                count,
            });
        }
        Ok(())
    }

    /// Containers owned by the named services, in runtime listing order.
    ///
    /// # Errors
    ///
    /// Returns an error if a name is unknown or the runtime cannot list.
    pub fn containers<S: AsRef<str>>(
        &self,
        names: &[S],
        stopped: bool,
        one_off: bool,
    ) -> Result<Vec<Container>> {
        let services = self.project.get_services(names, false)?;
        let listed = self.project.client().list_containers(stopped)?;
        let mut containers = Vec::new();
        for info in listed {
            for service in &services {
                if service.has_container(&info, one_off) {
                    containers.push(Container::from_info(info.clone()));
                }
            }
        }
        Ok(containers)
    }

    fn emit(&self, event: LifecycleEvent) {
        self.events.emit(event);
    }
}

impl std::fmt::Debug for Orchestrator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("project", &self.project.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use flotilla_common::error::FlotillaError;
    use flotilla_common::types::ContainerId;
    use flotilla_compose::declaration::ServiceDeclaration;

    use super::*;
    use crate::client::{BuildOptions, ContainerInfo, ContainerSpec, RuntimeClient};
    use crate::events::RecordingSink;
    use crate::memory::{MemoryRuntime, RuntimeCall};

    /// Delegates to a [`MemoryRuntime`] but refuses to create one container.
    #[derive(Debug)]
    struct RejectingRuntime {
        inner: Arc<MemoryRuntime>,
        reject: &'static str,
    }

    impl RuntimeClient for RejectingRuntime {
        fn create_container(&self, spec: &ContainerSpec) -> Result<ContainerId> {
            if spec.name == self.reject {
                return Err(FlotillaError::Runtime {
                    operation: "create",
                    message: "boom".into(),
                });
            }
            self.inner.create_container(spec)
        }

        fn start_container(&self, id: &ContainerId) -> Result<()> {
            self.inner.start_container(id)
        }

        fn stop_container(&self, id: &ContainerId, options: &StopOptions) -> Result<()> {
            self.inner.stop_container(id, options)
        }

        fn kill_container(&self, id: &ContainerId) -> Result<()> {
            self.inner.kill_container(id)
        }

        fn remove_container(&self, id: &ContainerId, options: &RemoveOptions) -> Result<()> {
            self.inner.remove_container(id, options)
        }

        fn list_containers(&self, include_stopped: bool) -> Result<Vec<ContainerInfo>> {
            self.inner.list_containers(include_stopped)
        }

        fn pull_image(&self, image: &str, options: &PullOptions) -> Result<()> {
            self.inner.pull_image(image, options)
        }

        fn build_image(&self, context: &Path, options: &BuildOptions) -> Result<String> {
            self.inner.build_image(context, options)
        }

        fn inspect_container(&self, id_or_name: &str) -> Result<ContainerInfo> {
            self.inner.inspect_container(id_or_name)
        }
    }

    const NONE: &[&str] = &[];

    fn project(runtime: &Arc<MemoryRuntime>) -> Project {
        Project::from_declarations(
            "test",
            vec![
                ServiceDeclaration::new("web")
                    .with_option("image", "busybox:latest")
                    .with_links(["db"]),
                ServiceDeclaration::new("db").with_option("image", "busybox:latest"),
            ],
            Arc::clone(runtime) as Arc<dyn RuntimeClient>,
            None,
        )
        .unwrap()
    }

    fn created_names(calls: &[RuntimeCall]) -> Vec<String> {
        calls
            .iter()
            .filter_map(|call| match call {
                RuntimeCall::Create(spec) => Some(spec.name.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn strategy_selection() {
        let mut options = UpOptions::default();
        assert_eq!(CreateStrategy::select(&options), CreateStrategy::Recreate);
        options.fresh_start = true;
        assert_eq!(CreateStrategy::select(&options), CreateStrategy::FreshStart);
        options.fresh_start = false;
        options.recreate = false;
        assert_eq!(CreateStrategy::select(&options), CreateStrategy::StartOrCreate);
    }

    #[test]
    fn up_with_fresh_start_creates_in_dependency_order() {
        let runtime = Arc::new(MemoryRuntime::new());
        let project = project(&runtime);
        let options = UpOptions {
            fresh_start: true,
            do_build: false,
            ..UpOptions::default()
        };
        let containers = Orchestrator::new(&project).up(NONE, &options).unwrap();
        assert_eq!(containers.len(), 2);

        let calls = runtime.calls();
        assert_eq!(calls.len(), 4);
        let RuntimeCall::Create(db) = &calls[0] else {
            panic!("expected create, got {:?}", calls[0]);
        };
        assert_eq!(db.name, "test_db_1");
        assert_eq!(db.image, "busybox:latest");
        assert!(db.links.is_empty());
        assert!(matches!(&calls[1], RuntimeCall::Start(id) if *id == containers[0].id));
        let RuntimeCall::Create(web) = &calls[2] else {
            panic!("expected create, got {:?}", calls[2]);
        };
        assert_eq!(web.name, "test_web_1");
        assert_eq!(
            web.links,
            vec![
                ("test_db_1".to_string(), "db".to_string()),
                ("test_db_1".to_string(), "test_db_1".to_string()),
                ("test_db_1".to_string(), "db_1".to_string()),
            ]
        );
        assert!(matches!(&calls[3], RuntimeCall::Start(id) if *id == containers[1].id));
    }

    #[test]
    fn up_named_service_starts_its_links_first() {
        let runtime = Arc::new(MemoryRuntime::new());
        let project = project(&runtime);
        let _ = Orchestrator::new(&project).up(&["web"], &UpOptions::default()).unwrap();
        assert_eq!(created_names(&runtime.calls()), vec!["test_db_1", "test_web_1"]);
    }

    #[test]
    fn up_without_links_touches_only_named_service() {
        let runtime = Arc::new(MemoryRuntime::new());
        let project = project(&runtime);
        let options = UpOptions {
            start_links: false,
            ..UpOptions::default()
        };
        let _ = Orchestrator::new(&project).up(&["web"], &options).unwrap();
        assert_eq!(created_names(&runtime.calls()), vec!["test_web_1"]);
    }

    #[test]
    fn stop_and_kill_walk_reverse_order() {
        let runtime = Arc::new(MemoryRuntime::new());
        let project = project(&runtime);
        let sink = Arc::new(RecordingSink::new());
        let orchestrator =
            Orchestrator::with_events(&project, Arc::clone(&sink) as Arc<dyn EventSink>);
        let _ = orchestrator.up(NONE, &UpOptions::default()).unwrap();

        orchestrator.stop(NONE, &StopOptions::default()).unwrap();
        let stopped: Vec<_> = sink
            .events()
            .into_iter()
            .filter(|e| matches!(e, LifecycleEvent::Stopped { .. }))
            .map(|e| e.service().to_string())
            .collect();
        assert_eq!(stopped, vec!["web", "db"]);
        assert!(orchestrator.containers(NONE, false, false).unwrap().is_empty());

        orchestrator.start(NONE).unwrap();
        orchestrator.kill(NONE).unwrap();
        let killed: Vec<_> = sink
            .events()
            .into_iter()
            .filter(|e| matches!(e, LifecycleEvent::Killed { .. }))
            .map(|e| e.service().to_string())
            .collect();
        assert_eq!(killed, vec!["web", "db"]);
    }

    #[test]
    fn build_skips_image_services() {
        let runtime = Arc::new(MemoryRuntime::new());
        let project = Project::from_declarations(
            "test",
            vec![
                ServiceDeclaration::new("app").with_option("build", "."),
                ServiceDeclaration::new("db").with_option("image", "postgres"),
            ],
            Arc::clone(&runtime) as Arc<dyn RuntimeClient>,
            None,
        )
        .unwrap();
        let sink = Arc::new(RecordingSink::new());
        Orchestrator::with_events(&project, Arc::clone(&sink) as Arc<dyn EventSink>)
            .build(NONE, true)
            .unwrap();

        let events = sink.events();
        assert!(events.contains(&LifecycleEvent::BuildSkipped {
            service: "db".into()
        }));
        assert!(
            events
                .iter()
                .any(|e| matches!(e, LifecycleEvent::Built { service, .. } if service == "app"))
        );
        assert!(runtime.calls().iter().any(|c| matches!(
            c,
            RuntimeCall::Build { tag, no_cache: true, .. } if tag == "test_app"
        )));
    }

    #[test]
    fn pull_includes_links() {
        let runtime = Arc::new(MemoryRuntime::new());
        let project = project(&runtime);
        Orchestrator::new(&project).pull(&["web"], false).unwrap();
        let pulled: Vec<_> = runtime
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                RuntimeCall::Pull(image) => Some(image),
                _ => None,
            })
            .collect();
        assert_eq!(pulled, vec!["busybox:latest", "busybox:latest"]);
    }

    #[test]
    fn remove_stopped_reports_counts() {
        let runtime = Arc::new(MemoryRuntime::new());
        let project = project(&runtime);
        let sink = Arc::new(RecordingSink::new());
        let orchestrator =
            Orchestrator::with_events(&project, Arc::clone(&sink) as Arc<dyn EventSink>);
        let _ = orchestrator.up(NONE, &UpOptions::default()).unwrap();
        orchestrator.stop(&["db"], &StopOptions::default()).unwrap();
        orchestrator.remove_stopped(NONE, &RemoveOptions::default()).unwrap();

        assert!(sink.events().contains(&LifecycleEvent::RemovedStopped {
            service: "db".into(),
            count: 1
        }));
        assert!(sink.events().contains(&LifecycleEvent::RemovedStopped {
            service: "web".into(),
            count: 0
        }));
        assert_eq!(orchestrator.containers(NONE, true, false).unwrap().len(), 1);
    }

    #[test]
    fn unknown_service_fails_before_touching_runtime() {
        let runtime = Arc::new(MemoryRuntime::new());
        let project = project(&runtime);
        assert!(Orchestrator::new(&project).up(&["cache"], &UpOptions::default()).is_err());
        assert!(runtime.calls().is_empty());
    }

    #[test]
    fn start_and_restart_follow_creation_order() {
        let runtime = Arc::new(MemoryRuntime::new());
        let project = project(&runtime);
        let sink = Arc::new(RecordingSink::new());
        let orchestrator =
            Orchestrator::with_events(&project, Arc::clone(&sink) as Arc<dyn EventSink>);
        let _ = orchestrator.up(NONE, &UpOptions::default()).unwrap();
        orchestrator.stop(NONE, &StopOptions::default()).unwrap();

        orchestrator.start(NONE).unwrap();
        orchestrator.restart(NONE, &StopOptions::default()).unwrap();

        let steps: Vec<_> = sink
            .events()
            .into_iter()
            .filter(|e| {
                matches!(
                    e,
                    LifecycleEvent::Started { .. } | LifecycleEvent::Restarted { .. }
                )
            })
            .collect();
        assert_eq!(
            steps,
            vec![
                LifecycleEvent::Started {
                    service: "db".into()
                },
                LifecycleEvent::Started {
                    service: "web".into()
                },
                LifecycleEvent::Restarted {
                    service: "db".into()
                },
                LifecycleEvent::Restarted {
                    service: "web".into()
                },
            ]
        );
    }

    #[test]
    fn runtime_failure_stops_the_remaining_services() {
        let memory = Arc::new(MemoryRuntime::new());
        let client = Arc::new(RejectingRuntime {
            inner: Arc::clone(&memory),
            reject: "test_b_1",
        });
        let project = Project::from_declarations(
            "test",
            vec![
                ServiceDeclaration::new("c")
                    .with_option("image", "busybox:latest")
                    .with_links(["b"]),
                ServiceDeclaration::new("b")
                    .with_option("image", "busybox:latest")
                    .with_links(["a"]),
                ServiceDeclaration::new("a").with_option("image", "busybox:latest"),
            ],
            client as Arc<dyn RuntimeClient>,
            None,
        )
        .unwrap();

        let err = Orchestrator::new(&project)
            .up(NONE, &UpOptions::default())
            .unwrap_err();
        assert!(matches!(err, FlotillaError::Runtime { operation: "create", .. }));

        let calls = memory.calls();
        assert_eq!(created_names(&calls), vec!["test_a_1"]);
        let starts = calls
            .iter()
            .filter(|c| matches!(c, RuntimeCall::Start(_)))
            .count();
        assert_eq!(starts, 1);
    }

    #[test]
    fn pull_skips_report_their_reason() {
        let runtime = Arc::new(MemoryRuntime::new());
        let project = Project::from_declarations(
            "test",
            vec![
                ServiceDeclaration::new("app").with_option("build", "."),
                ServiceDeclaration::new("bare"),
            ],
            Arc::clone(&runtime) as Arc<dyn RuntimeClient>,
            None,
        )
        .unwrap();
        let sink = Arc::new(RecordingSink::new());
        Orchestrator::with_events(&project, Arc::clone(&sink) as Arc<dyn EventSink>)
            .pull(NONE, false)
            .unwrap();

        let events = sink.events();
        assert!(events.contains(&LifecycleEvent::PullSkipped {
            service: "app".into(),
            builds_locally: true,
        }));
        assert!(events.contains(&LifecycleEvent::PullSkipped {
            service: "bare".into(),
            builds_locally: false,
        }));
        assert!(runtime.calls().is_empty());
    }
}
