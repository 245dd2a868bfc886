//! [`RuntimeClient`] backed by the Docker Engine API.
//!
//! Requests go through `bollard` on a current-thread `tokio` runtime owned
//! by the client, so every call blocks until the engine answers.

use std::path::Path;

use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, KillContainerOptions,
    ListContainersOptions, RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as EngineError;
use bollard::image::{BuildImageOptions, CreateImageOptions};
use bollard::models::{ContainerInspectResponse, ContainerSummary, HostConfig};
use flotilla_common::error::{FlotillaError, Result};
use flotilla_common::types::{ContainerId, ContainerState};
use futures_util::StreamExt;
use tokio::runtime::Runtime;

use crate::client::{
    BuildOptions, ContainerInfo, ContainerSpec, PullOptions, RemoveOptions, RuntimeClient,
    StopOptions,
};

/// Talks to the local Docker daemon.
#[derive(Debug)]
pub struct DockerClient {
    docker: Docker,
    runtime: Runtime,
}

impl DockerClient {
    /// Connects using the local defaults: `DOCKER_HOST` when set, the
    /// platform socket otherwise.
    ///
    /// The daemon is not contacted until the first request.
    ///
    /// # Errors
    ///
    /// Returns an error if the I/O runtime cannot be started or the
    /// connection settings are invalid.
    pub fn connect() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| FlotillaError::Runtime {
                operation: "connect",
                message: e.to_string(),
            })?;
        let docker = {
            let _guard = runtime.enter();
            Docker::connect_with_local_defaults().map_err(|e| {
                FlotillaError::config(format!("cannot connect to the Docker daemon: {e}"))
            })?
        };
        tracing::debug!("docker client ready");
        Ok(Self { docker, runtime })
    }
}

/// Maps an engine error, treating HTTP 404 as a missing `kind`.
fn engine_error(
    operation: &'static str,
    kind: &'static str,
    subject: &str,
    err: EngineError,
) -> FlotillaError {
    match err {
        EngineError::DockerResponseServerError {
            status_code: 404, ..
        } => FlotillaError::NotFound {
            kind,
            id: subject.to_string(),
        },
        other => FlotillaError::Runtime {
            operation,
            message: other.to_string(),
        },
    }
}

fn container_config(spec: &ContainerSpec) -> Config<String> {
    let environment = spec
        .environment
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect();
    let links = spec
        .links
        .iter()
        .map(|(container, alias)| format!("{container}:{alias}"))
        .collect();
    Config {
        image: Some(spec.image.clone()),
        cmd: (!spec.command.is_empty()).then(|| spec.command.clone()),
        env: Some(environment),
        attach_stdout: Some(!spec.detach),
        attach_stderr: Some(!spec.detach),
        host_config: Some(HostConfig {
            links: Some(links),
            volumes_from: Some(spec.volumes_from.clone()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Splits `repo[:tag]` for the pull endpoint, which pulls every tag when
/// none is given.
fn image_and_tag(image: &str) -> (&str, &str) {
    if image.contains('@') {
        return (image, "");
    }
    let name_start = image.rfind('/').map_or(0, |i| i + 1);
    match image[name_start..].rfind(':') {
        Some(i) => (&image[..name_start + i], &image[name_start + i + 1..]),
        None => (image, "latest"),
    }
}

fn summary_info(summary: ContainerSummary) -> Option<ContainerInfo> {
    let id = summary.id?;
    let names = summary.names.unwrap_or_default();
    // Linked containers also list `/<other>/<alias>` names.
    let name = names
        .iter()
        .map(|n| n.trim_start_matches('/'))
        .find(|n| !n.contains('/'))
        .or_else(|| names.first().map(String::as_str))
        .unwrap_or_default()
        .to_string();
    Some(ContainerInfo {
        id: ContainerId::new(id),
        name,
        image: summary.image.unwrap_or_default(),
        state: ContainerState::from_status(summary.state.as_deref().unwrap_or_default()),
    })
}

fn inspect_info(response: ContainerInspectResponse, id_or_name: &str) -> Result<ContainerInfo> {
    let id = response.id.ok_or_else(|| FlotillaError::NotFound {
        kind: "container",
        id: id_or_name.to_string(),
    })?;
    let status = response
        .state
        .and_then(|state| state.status)
        .map(|status| status.to_string())
        .unwrap_or_default();
    Ok(ContainerInfo {
        id: ContainerId::new(id),
        name: response
            .name
            .unwrap_or_default()
            .trim_start_matches('/')
            .to_string(),
        image: response
            .config
            .and_then(|config| config.image)
            .unwrap_or_default(),
        state: ContainerState::from_status(&status),
    })
}

fn context_archive(context: &Path) -> Result<Vec<u8>> {
    let io_error = |source| FlotillaError::Io {
        path: context.to_path_buf(),
        source,
    };
    let mut archive = tar::Builder::new(Vec::new());
    archive.append_dir_all(".", context).map_err(io_error)?;
    archive.into_inner().map_err(io_error)
}

impl RuntimeClient for DockerClient {
    fn create_container(&self, spec: &ContainerSpec) -> Result<ContainerId> {
        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };
        let response = self
            .runtime
            .block_on(
                self.docker
                    .create_container(Some(options), container_config(spec)),
            )
            .map_err(|e| engine_error("create", "image", &spec.image, e))?;
        for warning in &response.warnings {
            tracing::warn!(container = %spec.name, "{warning}");
        }
        Ok(ContainerId::new(response.id))
    }

    fn start_container(&self, id: &ContainerId) -> Result<()> {
        self.runtime
            .block_on(
                self.docker
                    .start_container(id.as_str(), None::<StartContainerOptions<String>>),
            )
            .map_err(|e| engine_error("start", "container", id.as_str(), e))
    }

    fn stop_container(&self, id: &ContainerId, options: &StopOptions) -> Result<()> {
        let options = options.timeout.map(|timeout| StopContainerOptions {
            t: i64::try_from(timeout.as_secs()).unwrap_or(i64::MAX),
        });
        self.runtime
            .block_on(self.docker.stop_container(id.as_str(), options))
            .map_err(|e| engine_error("stop", "container", id.as_str(), e))
    }

    fn kill_container(&self, id: &ContainerId) -> Result<()> {
        self.runtime
            .block_on(
                self.docker
                    .kill_container(id.as_str(), None::<KillContainerOptions<String>>),
            )
            .map_err(|e| engine_error("kill", "container", id.as_str(), e))
    }

    fn remove_container(&self, id: &ContainerId, options: &RemoveOptions) -> Result<()> {
        let options = RemoveContainerOptions {
            v: options.volumes,
            ..Default::default()
        };
        self.runtime
            .block_on(self.docker.remove_container(id.as_str(), Some(options)))
            .map_err(|e| engine_error("remove", "container", id.as_str(), e))
    }

    fn list_containers(&self, include_stopped: bool) -> Result<Vec<ContainerInfo>> {
        let options = ListContainersOptions::<String> {
            all: include_stopped,
            ..Default::default()
        };
        let summaries = self
            .runtime
            .block_on(self.docker.list_containers(Some(options)))
            .map_err(|e| engine_error("list", "container", "", e))?;
        Ok(summaries.into_iter().filter_map(summary_info).collect())
    }

    fn pull_image(&self, image: &str, options: &PullOptions) -> Result<()> {
        if options.insecure_registry {
            tracing::warn!(
                image,
                "insecure registries are configured on the Docker daemon, not per pull"
            );
        }
        let (from_image, tag) = image_and_tag(image);
        let options = CreateImageOptions {
            from_image,
            tag,
            ..Default::default()
        };
        self.runtime.block_on(async {
            let mut progress = self.docker.create_image(Some(options), None, None);
            while let Some(update) = progress.next().await {
                let update = update.map_err(|e| engine_error("pull", "image", image, e))?;
                if let Some(status) = update.status {
                    tracing::trace!(image, %status, "pull progress");
                }
            }
            Ok::<_, FlotillaError>(())
        })
    }

    fn build_image(&self, context: &Path, options: &BuildOptions) -> Result<String> {
        let archive = context_archive(context)?;
        let build = BuildImageOptions {
            t: options.tag.as_str(),
            nocache: options.no_cache,
            rm: true,
            ..Default::default()
        };
        self.runtime.block_on(async {
            let mut image_id = None;
            let mut output = self.docker.build_image(build, None, Some(archive.into()));
            while let Some(update) = output.next().await {
                let update = update.map_err(|e| engine_error("build", "image", &options.tag, e))?;
                if let Some(message) = update.error {
                    return Err(FlotillaError::Runtime {
                        operation: "build",
                        message,
                    });
                }
                if let Some(line) = update.stream {
                    tracing::debug!(tag = %options.tag, "{}", line.trim_end());
                }
                if let Some(id) = update.aux.and_then(|aux| aux.id) {
                    image_id = Some(id);
                }
            }
            Ok(image_id.unwrap_or_else(|| options.tag.clone()))
        })
    }

    fn inspect_container(&self, id_or_name: &str) -> Result<ContainerInfo> {
        let response = self
            .runtime
            .block_on(
                self.docker
                    .inspect_container(id_or_name, None::<InspectContainerOptions>),
            )
            .map_err(|e| engine_error("inspect", "container", id_or_name, e))?;
        inspect_info(response, id_or_name)
    }
}
