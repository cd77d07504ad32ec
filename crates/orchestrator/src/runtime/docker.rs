//! Docker Engine adapter.
//!
//! Talks to the daemon through `bollard`, over the local Unix socket by
//! default or over TCP when the endpoint names a host.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, NetworkingConfig,
};
use bollard::errors::Error as DockerError;
use bollard::models::EndpointSettings;
use bollard::network::{CreateNetworkOptions, ListNetworksOptions};
use bollard::{Docker, API_DEFAULT_VERSION};
use tracing::debug;

use super::{
    ContainerRuntime, InstanceHandle, InstanceSpec, InstanceState, InstanceSummary, RuntimeError,
};

/// Default daemon endpoint.
pub const DEFAULT_ENDPOINT: &str = "unix:///var/run/docker.sock";

/// Seconds before a single Engine API call is abandoned.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Where the daemon listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Path of a local socket.
    Socket(String),
    /// `host:port` reached over plain HTTP.
    Http(String),
}

impl Endpoint {
    /// Accepts `unix:///path`, a bare absolute path, `tcp://host:port` or
    /// `http://host:port`.
    pub fn parse(endpoint: &str) -> Self {
        if let Some(path) = endpoint.strip_prefix("unix://") {
            return Endpoint::Socket(path.to_owned());
        }
        if endpoint.starts_with('/') {
            return Endpoint::Socket(endpoint.to_owned());
        }
        let addr = endpoint
            .strip_prefix("tcp://")
            .or_else(|| endpoint.strip_prefix("http://"))
            .unwrap_or(endpoint);
        Endpoint::Http(addr.trim_end_matches('/').to_owned())
    }
}

/// Map an Engine error status onto [`RuntimeError`].
fn engine_error(op: &'static str, target: &str, err: DockerError) -> RuntimeError {
    match err {
        DockerError::DockerResponseServerError {
            status_code: 404, ..
        } => RuntimeError::NotFound(target.to_owned()),
        DockerError::DockerResponseServerError {
            status_code: 409, ..
        } => RuntimeError::Conflict(target.to_owned()),
        DockerError::DockerResponseServerError {
            status_code,
            message,
        } => RuntimeError::Api {
            op,
            status: status_code,
            message,
        },
        other => RuntimeError::Docker(other),
    }
}

/// `304 Not Modified` is success: the daemon answers start/stop of an
/// instance already in the requested state with it.
fn unless_unmodified(
    op: &'static str,
    target: &str,
    result: Result<(), DockerError>,
) -> Result<(), RuntimeError> {
    match result {
        Ok(()) => Ok(()),
        Err(DockerError::DockerResponseServerError {
            status_code: 304, ..
        }) => Ok(()),
        Err(err) => Err(engine_error(op, target, err)),
    }
}

fn network_names<V>(networks: Option<HashMap<String, V>>) -> Vec<String> {
    let mut names: Vec<String> = networks.unwrap_or_default().into_keys().collect();
    names.sort();
    names
}

/// [`ContainerRuntime`] backed by a Docker daemon.
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to the daemon at `endpoint`, e.g. `unix:///var/run/docker.sock`
    /// or `tcp://127.0.0.1:2375`. Nothing is sent until the first call.
    pub fn new(endpoint: &str) -> Result<Self, RuntimeError> {
        let docker = match Endpoint::parse(endpoint) {
            Endpoint::Socket(path) => {
                Docker::connect_with_socket(&path, REQUEST_TIMEOUT_SECS, API_DEFAULT_VERSION)?
            }
            Endpoint::Http(addr) => Docker::connect_with_http(
                &format!("http://{}", addr),
                REQUEST_TIMEOUT_SECS,
                API_DEFAULT_VERSION,
            )?,
        };
        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn create_instance(&self, spec: &InstanceSpec) -> Result<InstanceHandle, RuntimeError> {
        let options = CreateContainerOptions {
            name: spec.hostname.clone(),
            platform: None,
        };
        let config = Config {
            image: Some(spec.image.clone()),
            hostname: Some(spec.hostname.clone()),
            env: Some(spec.env.clone()),
            labels: Some(spec.labels.clone().into_iter().collect()),
            networking_config: Some(NetworkingConfig {
                endpoints_config: HashMap::from([(
                    spec.network.clone(),
                    EndpointSettings::default(),
                )]),
            }),
            ..Default::default()
        };
        let created = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|err| engine_error("create", &spec.hostname, err))?;
        debug!(hostname = %spec.hostname, id = %created.id, "container created");
        Ok(InstanceHandle(created.id))
    }

    async fn start(&self, handle: &InstanceHandle) -> Result<(), RuntimeError> {
        let result = self
            .docker
            .start_container::<String>(handle.as_str(), None)
            .await;
        unless_unmodified("start", handle.as_str(), result)
    }

    async fn stop(&self, handle: &InstanceHandle) -> Result<(), RuntimeError> {
        let result = self.docker.stop_container(handle.as_str(), None).await;
        unless_unmodified("stop", handle.as_str(), result)
    }

    async fn remove(&self, handle: &InstanceHandle) -> Result<(), RuntimeError> {
        self.docker
            .remove_container(handle.as_str(), None)
            .await
            .map_err(|err| engine_error("remove", handle.as_str(), err))
    }

    async fn inspect(&self, handle: &InstanceHandle) -> Result<InstanceState, RuntimeError> {
        let inspect = self
            .docker
            .inspect_container(handle.as_str(), None)
            .await
            .map_err(|err| engine_error("inspect", handle.as_str(), err))?;
        Ok(InstanceState {
            running: inspect
                .state
                .and_then(|state| state.running)
                .unwrap_or(false),
            networks: network_names(inspect.network_settings.and_then(|ns| ns.networks)),
        })
    }

    async fn list_instances(
        &self,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<InstanceSummary>, RuntimeError> {
        let label_filters: Vec<String> = labels.iter().map(|(k, v)| format!("{k}={v}")).collect();
        let options = ListContainersOptions {
            filters: HashMap::from([("label".to_owned(), label_filters)]),
            ..Default::default()
        };
        let entries = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|err| engine_error("list", "containers", err))?;
        Ok(entries
            .into_iter()
            .filter_map(|entry| {
                // names come back as "/name"
                let hostname = entry.names?.first()?.trim_start_matches('/').to_owned();
                Some(InstanceSummary {
                    id: entry.id.unwrap_or_default(),
                    hostname,
                    networks: network_names(entry.network_settings.and_then(|ns| ns.networks)),
                })
            })
            .collect())
    }

    async fn list_networks(&self) -> Result<Vec<String>, RuntimeError> {
        let networks = self
            .docker
            .list_networks(None::<ListNetworksOptions<String>>)
            .await
            .map_err(|err| engine_error("list", "networks", err))?;
        Ok(networks.into_iter().filter_map(|n| n.name).collect())
    }

    async fn create_network(&self, name: &str) -> Result<(), RuntimeError> {
        let options = CreateNetworkOptions {
            name: name.to_owned(),
            driver: "bridge".to_owned(),
            ..Default::default()
        };
        self.docker
            .create_network(options)
            .await
            .map_err(|err| engine_error("create network", name, err))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "docker"
    }
}
