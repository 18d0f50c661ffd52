//! Docker implementation of [`EngineClient`] via bollard.
//!
//! Translates the engine-neutral types into Docker API calls. A 404 from the
//! daemon becomes [`EngineError::NotFound`].

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::models::{
    BuildInfo, ContainerCreateBody, ContainerSummary, CreateImageInfo, HostConfig,
    PortBinding as DockerPortBinding, RestartPolicy as DockerRestartPolicy, RestartPolicyNameEnum,
};
use bollard::query_parameters::{
    BuildImageOptionsBuilder, CreateContainerOptionsBuilder, CreateImageOptionsBuilder,
    ListContainersOptionsBuilder, RemoveContainerOptionsBuilder, StartContainerOptions,
    StopContainerOptionsBuilder,
};
use bollard::Docker;
use futures_util::StreamExt;
use tracing::{debug, info};

use super::{
    BuildLine, BuildStream, EngineClient, EngineContainer, EngineError, EngineVersion,
    PublishedPort, PullProgress, PullStream, RestartPolicy, RunSpec,
};
use crate::error::{Result, VaultError};

/// Seconds the daemon waits for a graceful stop before killing.
const STOP_TIMEOUT_SECS: i32 = 10;

impl From<bollard::errors::Error> for EngineError {
    fn from(e: bollard::errors::Error) -> Self {
        match e {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                message,
            } => EngineError::NotFound { resource: message },
            bollard::errors::Error::DockerResponseServerError {
                status_code,
                message,
            } => EngineError::Api {
                status: status_code,
                message,
            },
            other => EngineError::Transport(other.to_string()),
        }
    }
}

/// Engine client backed by the local Docker daemon.
#[derive(Clone)]
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connect with the platform defaults (`DOCKER_HOST` or the local socket)
    /// and verify the daemon answers.
    ///
    /// Any failure here is a single [`VaultError::Connectivity`]; nothing is
    /// retried.
    pub async fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| VaultError::Connectivity(e.into()))?;
        let engine = Self::from_client(docker);
        engine.ping().await.map_err(VaultError::Connectivity)?;
        info!("Connected to Docker daemon");
        Ok(engine)
    }

    /// Wrap an already configured bollard client.
    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }
}

#[async_trait]
impl EngineClient for DockerEngine {
    async fn ping(&self) -> std::result::Result<(), EngineError> {
        self.docker.ping().await.map(|_| ()).map_err(Into::into)
    }

    async fn version(&self) -> std::result::Result<EngineVersion, EngineError> {
        let version = self.docker.version().await?;
        Ok(EngineVersion {
            version: version.version.unwrap_or_else(|| "Unknown".to_string()),
            api_version: version.api_version.unwrap_or_else(|| "Unknown".to_string()),
        })
    }

    async fn list_containers(&self) -> std::result::Result<Vec<EngineContainer>, EngineError> {
        let options = ListContainersOptionsBuilder::new().all(true).build();
        let summaries = self.docker.list_containers(Some(options)).await?;
        Ok(summaries.into_iter().map(container_from_summary).collect())
    }

    async fn image_exists(&self, reference: &str) -> std::result::Result<bool, EngineError> {
        match self.docker.inspect_image(reference).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn pull_image(&self, repository: &str, tag: &str) -> PullStream<'_> {
        debug!(repository, tag, "Starting image pull");
        let options = CreateImageOptionsBuilder::new()
            .from_image(repository)
            .tag(tag)
            .build();
        self.docker
            .create_image(Some(options), None, None)
            .map(|item| item.map_err(EngineError::from).and_then(progress_from_info))
            .boxed()
    }

    fn build_image(&self, context: Vec<u8>, tag: &str) -> BuildStream<'_> {
        debug!(tag, context_bytes = context.len(), "Starting image build");
        let options = BuildImageOptionsBuilder::new()
            .dockerfile("Dockerfile")
            .t(tag)
            .rm(true)
            .build();
        self.docker
            .build_image(options, None, Some(bollard::body_full(context.into())))
            .map(|item| item.map(build_line_from_info).map_err(EngineError::from))
            .boxed()
    }

    async fn run_container(&self, spec: RunSpec) -> std::result::Result<String, EngineError> {
        let options = CreateContainerOptionsBuilder::new().name(&spec.name).build();
        let body = container_body(&spec);

        info!("Creating container {} with image {}", spec.name, spec.image);
        let created = self.docker.create_container(Some(options), body).await?;

        info!("Starting container {}", created.id);
        self.docker
            .start_container(&created.id, None::<StartContainerOptions>)
            .await?;
        Ok(created.id)
    }

    async fn start_container(&self, id: &str) -> std::result::Result<(), EngineError> {
        self.docker
            .start_container(id, None::<StartContainerOptions>)
            .await
            .map_err(Into::into)
    }

    async fn stop_container(&self, id: &str) -> std::result::Result<(), EngineError> {
        let options = StopContainerOptionsBuilder::new().t(STOP_TIMEOUT_SECS).build();
        self.docker
            .stop_container(id, Some(options))
            .await
            .map_err(Into::into)
    }

    async fn remove_container(&self, id: &str, force: bool) -> std::result::Result<(), EngineError> {
        let options = RemoveContainerOptionsBuilder::new().force(force).build();
        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(Into::into)
    }
}

fn container_from_summary(summary: ContainerSummary) -> EngineContainer {
    let name = summary
        .names
        .as_ref()
        .and_then(|names| names.first())
        .map(|n| n.trim_start_matches('/').to_string())
        .unwrap_or_default();

    let ports = summary
        .ports
        .unwrap_or_default()
        .into_iter()
        .map(|p| PublishedPort {
            container_port: p.private_port,
            host_port: p.public_port,
        })
        .collect();

    EngineContainer {
        id: summary.id.unwrap_or_default(),
        name,
        image: summary.image.unwrap_or_default(),
        labels: summary.labels.unwrap_or_default(),
        state: summary.state.map(|s| s.to_string()).unwrap_or_default(),
        ports,
    }
}

fn progress_from_info(info: CreateImageInfo) -> std::result::Result<PullProgress, EngineError> {
    if let Some(error) = info.error {
        return Err(EngineError::Stream(error));
    }
    let (current, total) = info
        .progress_detail
        .map(|d| (d.current, d.total))
        .unwrap_or((None, None));
    Ok(PullProgress {
        status: info.status.unwrap_or_default(),
        layer: info.id,
        progress: info.progress.filter(|p| !p.is_empty()),
        current,
        total,
    })
}

fn build_line_from_info(info: BuildInfo) -> BuildLine {
    match info.error {
        Some(error) => BuildLine::Error(error),
        None => BuildLine::Output(info.stream.or(info.status).unwrap_or_default()),
    }
}

/// Docker create body for a run spec: ports, binds, caps, restart policy.
fn container_body(spec: &RunSpec) -> ContainerCreateBody {
    let port_bindings: HashMap<String, Option<Vec<DockerPortBinding>>> = spec
        .ports
        .iter()
        .map(|binding| {
            (
                format!("{}/tcp", binding.container_port),
                Some(vec![DockerPortBinding {
                    host_ip: None,
                    host_port: Some(binding.host_port.to_string()),
                }]),
            )
        })
        .collect();

    let restart_policy = match spec.restart_policy {
        RestartPolicy::UnlessStopped => Some(DockerRestartPolicy {
            name: Some(RestartPolicyNameEnum::UNLESS_STOPPED),
            maximum_retry_count: None,
        }),
        RestartPolicy::Never => None,
    };

    let binds: Vec<String> = spec.volumes.iter().map(|v| v.bind_spec()).collect();

    ContainerCreateBody {
        image: Some(spec.image.clone()),
        labels: Some(spec.labels.clone()),
        env: Some(spec.env.clone()),
        host_config: Some(HostConfig {
            port_bindings: Some(port_bindings),
            binds: if binds.is_empty() { None } else { Some(binds) },
            shm_size: Some(spec.limits.shm_size_bytes),
            memory: Some(spec.limits.memory_bytes),
            nano_cpus: Some(spec.limits.nano_cpus),
            restart_policy,
            ..Default::default()
        }),
        ..Default::default()
    }
}
