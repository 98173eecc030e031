use super::{ContainerRuntime, CreateOptions, CreatedContainer};
use anyhow::Context;
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
    RemoveContainerOptions, StartContainerOptions,
};
use bollard::models::{
    ContainerStateStatusEnum, HealthStatusEnum, HostConfig, Ipam, IpamConfig, PortBinding,
    RestartPolicy, RestartPolicyNameEnum,
};
use bollard::network::CreateNetworkOptions;
use bollard::Docker;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Docker Engine API-backed runtime adapter. Every orchestrated container
/// is named `vnc_<client_id>` or `vnc_pool_<n>`; the `vnc_` prefix is the
/// reconciler's discovery key.
pub struct DockerRuntime {
    client: Docker,
}

impl DockerRuntime {
    /// Connect using the daemon's default local socket (`DOCKER_HOST`, or
    /// the platform default unix/named pipe when unset).
    pub fn connect() -> anyhow::Result<Self> {
        let client = Docker::connect_with_socket_defaults()
            .context("failed to connect to the Docker daemon")?;
        Ok(Self { client })
    }

    async fn ensure_network(&self, name: &str, subnet: &str) -> anyhow::Result<()> {
        if self.client.inspect_network::<String>(name, None).await.is_ok() {
            debug!(network = name, "docker network already exists");
            return Ok(());
        }

        info!(network = name, subnet, "creating docker network");

        let options = CreateNetworkOptions {
            name: name.to_string(),
            driver: "bridge".to_string(),
            ipam: Ipam {
                config: Some(vec![IpamConfig {
                    subnet: Some(subnet.to_string()),
                    ..Default::default()
                }]),
                ..Default::default()
            },
            ..Default::default()
        };

        self.client
            .create_network(options)
            .await
            .context("failed to create docker network")?;

        Ok(())
    }

    async fn remove_leftover(&self, name: &str) {
        if self
            .client
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
            .is_ok()
        {
            warn!(name, "removing leftover container with the same name");
            let _ = self
                .client
                .remove_container(
                    name,
                    Some(RemoveContainerOptions {
                        force: true,
                        ..Default::default()
                    }),
                )
                .await;
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn create(&self, opts: CreateOptions<'_>) -> anyhow::Result<CreatedContainer> {
        self.remove_leftover(opts.name).await;

        if let Some(network) = opts.network {
            self.ensure_network(network, opts.network_subnet.unwrap_or_default())
                .await?;
        }

        let port_key = format!("{}/tcp", opts.container_port);
        let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
        port_bindings.insert(
            port_key.clone(),
            Some(vec![PortBinding {
                host_ip: Some("0.0.0.0".to_string()),
                host_port: Some(opts.host_port.to_string()),
            }]),
        );

        let mut exposed_ports: HashMap<String, HashMap<(), ()>> = HashMap::new();
        exposed_ports.insert(port_key, HashMap::new());

        let host_config = HostConfig {
            port_bindings: Some(port_bindings),
            network_mode: opts.network.map(|n| n.to_string()),
            restart_policy: Some(RestartPolicy {
                name: Some(RestartPolicyNameEnum::UNLESS_STOPPED),
                maximum_retry_count: None,
            }),
            ..Default::default()
        };

        let env: Vec<String> = opts
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        let config = Config {
            image: Some(opts.image.to_string()),
            env: Some(env),
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        };

        info!(
            name = opts.name,
            port = opts.host_port,
            image = opts.image,
            "creating container"
        );

        let response = self
            .client
            .create_container(
                Some(CreateContainerOptions {
                    name: opts.name.to_string(),
                    platform: None,
                }),
                config,
            )
            .await
            .context("failed to create container")?;

        self.client
            .start_container(&response.id, None::<StartContainerOptions<String>>)
            .await
            .context("failed to start container")?;

        info!(
            name = opts.name,
            id = &response.id[..12.min(response.id.len())],
            "container started"
        );

        Ok(CreatedContainer {
            id: response.id,
            name: opts.name.to_string(),
            port: opts.host_port,
        })
    }

    async fn remove(&self, container_id: &str) {
        match self
            .client
            .remove_container(
                container_id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
        {
            Ok(()) => info!(container_id, "container removed"),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => {
                warn!(container_id, "container already gone");
            }
            Err(e) => warn!(container_id, error = %e, "failed to remove container"),
        }
    }

    async fn is_healthy(&self, container_id: &str) -> bool {
        match self
            .client
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await
        {
            Ok(details) => details
                .state
                .and_then(|s| s.status)
                .map(|status| status == ContainerStateStatusEnum::RUNNING)
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn list_orchestrated(&self) -> HashMap<String, CreatedContainer> {
        let mut filters = HashMap::new();
        filters.insert("name".to_string(), vec!["vnc_".to_string()]);

        let containers = match self
            .client
            .list_containers(Some(ListContainersOptions {
                all: false,
                filters,
                ..Default::default()
            }))
            .await
        {
            Ok(containers) => containers,
            Err(e) => {
                warn!(error = %e, "failed to list orchestrated containers");
                return HashMap::new();
            }
        };

        let mut result = HashMap::new();
        for container in containers {
            let Some(id) = container.id else { continue };
            let Some(name) = container
                .names
                .as_ref()
                .and_then(|names| names.first())
                .map(|n| n.trim_start_matches('/').to_string())
            else {
                continue;
            };

            if container.state.as_deref() != Some("running") {
                continue;
            }

            let host_port = container
                .ports
                .unwrap_or_default()
                .into_iter()
                .find_map(|p| p.public_port);

            if let Some(port) = host_port {
                result.insert(
                    name.clone(),
                    CreatedContainer {
                        id,
                        name,
                        port,
                    },
                );
            }
        }

        debug!(count = result.len(), "discovered orchestrated containers");
        result
    }

    async fn wait_ready(&self, container_id: &str, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            match self
                .client
                .inspect_container(container_id, None::<InspectContainerOptions>)
                .await
            {
                Ok(details) => {
                    let health = details.state.and_then(|s| s.health).and_then(|h| h.status);
                    match health {
                        Some(HealthStatusEnum::HEALTHY) => return true,
                        Some(HealthStatusEnum::UNHEALTHY) => return false,
                        _ => {}
                    }
                }
                Err(_) => return false,
            }

            if tokio::time::Instant::now() >= deadline {
                warn!(container_id, "container not healthy before timeout, proceeding anyway");
                return false;
            }

            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }
}
