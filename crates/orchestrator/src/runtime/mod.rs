//! Container runtime abstraction.
//!
//! The orchestrator never talks to a container engine directly. It goes
//! through [`ContainerRuntime`], which has two implementations:
//!
//! - **DockerRuntime**: the Docker Engine API, over the local socket or TCP
//! - **MemoryRuntime**: an in-process fake for tests and local runs

pub mod docker;
pub mod memory;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;

pub use docker::DockerRuntime;
pub use memory::MemoryRuntime;

/// Label key/value marking an instance as a balancer replica.
pub const ROLE_LABEL: (&str, &str) = ("role", "server-replica");

/// Label key/value marking an instance as owned by this balancer.
pub const MANAGED_BY_LABEL: (&str, &str) = ("managedBy", "load-balancer");

/// Labels stamped on every instance the balancer creates and used to find
/// them again after a restart.
pub fn ownership_labels() -> BTreeMap<String, String> {
    [ROLE_LABEL, MANAGED_BY_LABEL]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect()
}

/// Everything the runtime needs to create one replica.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSpec {
    pub image: String,
    /// Used as both the container name and its hostname.
    pub hostname: String,
    /// `KEY=value` pairs.
    pub env: Vec<String>,
    pub network: String,
    pub labels: BTreeMap<String, String>,
}

/// Reference to a runtime instance, by id or by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceHandle(pub String);

impl InstanceHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for InstanceHandle {
    fn from(name: &str) -> Self {
        InstanceHandle(name.to_owned())
    }
}

impl fmt::Display for InstanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of inspecting an instance.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InstanceState {
    pub running: bool,
    pub networks: Vec<String>,
}

/// One entry of an instance listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSummary {
    pub id: String,
    pub hostname: String,
    pub networks: Vec<String>,
}

/// Errors reported by a container runtime.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The request never got a usable answer.
    #[error("runtime request failed: {0}")]
    Docker(#[from] bollard::errors::Error),

    /// The runtime answered with an error status.
    #[error("{op} returned {status}: {message}")]
    Api {
        op: &'static str,
        status: u16,
        message: String,
    },

    #[error("no such instance: {0}")]
    NotFound(String),

    #[error("instance name already in use: {0}")]
    Conflict(String),

    /// Failure injected by [`MemoryRuntime`].
    #[error("injected failure during {op} of {target}")]
    Injected { op: &'static str, target: String },
}

/// Operations the orchestrator needs from a container runtime.
///
/// # Thread Safety
///
/// Implementations are shared across tasks behind an `Arc` and must be
/// `Send + Sync`. Calls for different instances may run concurrently.
#[async_trait]
pub trait ContainerRuntime: Send + Sync + 'static {
    /// Create (but do not start) an instance.
    async fn create_instance(&self, spec: &InstanceSpec) -> Result<InstanceHandle, RuntimeError>;

    async fn start(&self, handle: &InstanceHandle) -> Result<(), RuntimeError>;

    async fn stop(&self, handle: &InstanceHandle) -> Result<(), RuntimeError>;

    async fn remove(&self, handle: &InstanceHandle) -> Result<(), RuntimeError>;

    async fn inspect(&self, handle: &InstanceHandle) -> Result<InstanceState, RuntimeError>;

    /// Running instances carrying every one of `labels`.
    async fn list_instances(
        &self,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<InstanceSummary>, RuntimeError>;

    async fn list_networks(&self) -> Result<Vec<String>, RuntimeError>;

    async fn create_network(&self, name: &str) -> Result<(), RuntimeError>;

    /// Name for logs.
    fn name(&self) -> &'static str;
}
