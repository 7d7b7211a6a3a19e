/// Container runtime boundary.
///
/// The controller only needs four calls from the runtime: pull, create,
/// start, remove. `DockerRuntime` is the bollard-backed production
/// implementation; tests substitute a fake without touching the process
/// environment.

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, RemoveContainerOptions, StartContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, PortBinding};
use bollard::{Docker, API_DEFAULT_VERSION};
use futures_util::stream::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use crate::error::LifecycleError;
use crate::spec::{ContainerHandle, ContainerSpec};

/// Connection settings for the runtime endpoint.
///
/// Passed in explicitly so the embedder picks the endpoint instead of
/// the library reading ambient environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Endpoint override: a unix socket path (optionally `unix://`-prefixed)
    /// or an `http(s)://` / `tcp://` address. `None` uses the platform's
    /// local Docker defaults.
    pub endpoint: Option<String>,
    /// Timeout in seconds applied to runtime API calls.
    pub timeout_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: 120,
        }
    }
}

/// Minimal contract the lifecycle controller needs from a container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync + 'static {
    /// Pull `image` from its registry, waiting for the pull to finish.
    async fn pull_image(&self, image: &str) -> Result<(), LifecycleError>;

    /// Create a container for `spec` and return its runtime-assigned handle.
    async fn create_container(&self, spec: &ContainerSpec)
        -> Result<ContainerHandle, LifecycleError>;

    /// Start a created container.
    async fn start_container(&self, handle: &ContainerHandle) -> Result<(), LifecycleError>;

    /// Force-stop and remove the container, no grace period.
    async fn remove_container(&self, handle: &ContainerHandle) -> Result<(), LifecycleError>;
}

/// Bollard-backed Docker runtime.
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to the Docker endpoint described by `config`.
    pub fn connect(config: &RuntimeConfig) -> Result<Self, LifecycleError> {
        let docker = match config.endpoint.as_deref() {
            None => Docker::connect_with_local_defaults(),
            Some(ep)
                if ep.starts_with("http://")
                    || ep.starts_with("https://")
                    || ep.starts_with("tcp://") =>
            {
                Docker::connect_with_http(ep, config.timeout_secs, API_DEFAULT_VERSION)
            }
            Some(ep) => {
                let path = ep.strip_prefix("unix://").unwrap_or(ep);
                Docker::connect_with_socket(path, config.timeout_secs, API_DEFAULT_VERSION)
            }
        }
        .map_err(LifecycleError::ClientInit)?;

        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn pull_image(&self, image: &str) -> Result<(), LifecycleError> {
        let options = Some(CreateImageOptions {
            from_image: image,
            ..Default::default()
        });

        // Drain the whole progress stream on both the success and the
        // error path so the response is released exactly once.
        let mut stream = self.docker.create_image(options, None, None);
        let mut first_err = None;

        while let Some(progress) = stream.next().await {
            match progress {
                Ok(info) => {
                    if let Some(status) = info.status {
                        debug!(image = %image, status = %status, "pull progress");
                    }
                }
                Err(e) => {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }

        match first_err {
            None => {
                info!(image = %image, "image pulled");
                Ok(())
            }
            Some(source) => Err(LifecycleError::ImagePull {
                image: image.to_string(),
                source,
            }),
        }
    }

    async fn create_container(
        &self,
        spec: &ContainerSpec,
    ) -> Result<ContainerHandle, LifecycleError> {
        let tcp_port = spec.tcp_port_key();

        // Exactly one TCP binding: container <port>/tcp -> 0.0.0.0:<port>.
        let mut port_bindings = HashMap::new();
        port_bindings.insert(
            tcp_port.clone(),
            Some(vec![PortBinding {
                host_ip: Some("0.0.0.0".to_string()),
                host_port: Some(spec.host_port.clone()),
            }]),
        );

        let mut exposed_ports = HashMap::new();
        exposed_ports.insert(tcp_port, HashMap::new());

        let config = Config {
            image: Some(spec.image.clone()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(HostConfig {
                port_bindings: Some(port_bindings),
                ..Default::default()
            }),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.as_str(),
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|source| LifecycleError::ContainerCreate {
                name: spec.name.clone(),
                source,
            })?;

        debug!(container_id = %response.id, name = %spec.name, "container created");
        Ok(ContainerHandle {
            id: response.id,
            name: spec.name.clone(),
        })
    }

    async fn start_container(&self, handle: &ContainerHandle) -> Result<(), LifecycleError> {
        self.docker
            .start_container(&handle.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|source| LifecycleError::ContainerStart {
                id: handle.id.clone(),
                source,
            })
    }

    async fn remove_container(&self, handle: &ContainerHandle) -> Result<(), LifecycleError> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };

        self.docker
            .remove_container(&handle.id, Some(options))
            .await
            .map_err(|source| LifecycleError::ContainerRemove {
                id: handle.id.clone(),
                source,
            })
    }
}
