//! In-process container runtime.
//!
//! Keeps instances in a map instead of talking to a daemon. Every create
//! hands out a fresh id, so a replica replaced under the same hostname is
//! distinguishable from its predecessor. Failures can be injected per
//! hostname to exercise the orchestrator's error paths.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use super::{
    ContainerRuntime, InstanceHandle, InstanceSpec, InstanceState, InstanceSummary, RuntimeError,
};

#[derive(Debug, Clone)]
struct MemoryInstance {
    id: String,
    spec: InstanceSpec,
    running: bool,
}

#[derive(Debug, Default)]
struct MemoryState {
    /// Instances by name.
    instances: HashMap<String, MemoryInstance>,
    networks: BTreeSet<String>,
    next_id: u64,
    create_calls: usize,
    failing_creates: HashSet<String>,
    failing_starts: HashSet<String>,
}

impl MemoryState {
    /// Resolve a handle that may be either an id or a name.
    fn resolve(&self, handle: &InstanceHandle) -> Option<String> {
        if self.instances.contains_key(handle.as_str()) {
            return Some(handle.0.clone());
        }
        self.instances
            .iter()
            .find(|(_, instance)| instance.id == handle.0)
            .map(|(name, _)| name.clone())
    }

    fn get_mut(&mut self, handle: &InstanceHandle) -> Result<&mut MemoryInstance, RuntimeError> {
        let name = self
            .resolve(handle)
            .ok_or_else(|| RuntimeError::NotFound(handle.0.clone()))?;
        self.instances
            .get_mut(&name)
            .ok_or_else(|| RuntimeError::NotFound(handle.0.clone()))
    }
}

/// [`ContainerRuntime`] that lives entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryRuntime {
    state: Mutex<MemoryState>,
}

impl MemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a running instance as if it had been created by an earlier
    /// balancer process.
    pub fn seed(&self, hostname: &str, labels: BTreeMap<String, String>, network: &str) -> String {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = format!("mem-{}", state.next_id);
        let spec = InstanceSpec {
            image: "seeded".to_owned(),
            hostname: hostname.to_owned(),
            env: Vec::new(),
            network: network.to_owned(),
            labels,
        };
        state.instances.insert(
            hostname.to_owned(),
            MemoryInstance {
                id: id.clone(),
                spec,
                running: true,
            },
        );
        id
    }

    /// Make every future create of `hostname` fail.
    pub fn fail_creates(&self, hostname: &str) {
        self.state.lock().failing_creates.insert(hostname.to_owned());
    }

    /// Make every future start of `hostname` fail.
    pub fn fail_starts(&self, hostname: &str) {
        self.state.lock().failing_starts.insert(hostname.to_owned());
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.failing_creates.clear();
        state.failing_starts.clear();
    }

    /// Id of the instance currently named `hostname`.
    pub fn instance_id(&self, hostname: &str) -> Option<String> {
        self.state
            .lock()
            .instances
            .get(hostname)
            .map(|instance| instance.id.clone())
    }

    pub fn is_running(&self, hostname: &str) -> bool {
        self.state
            .lock()
            .instances
            .get(hostname)
            .is_some_and(|instance| instance.running)
    }

    /// Spec the instance named `hostname` was created with.
    pub fn spec(&self, hostname: &str) -> Option<InstanceSpec> {
        self.state
            .lock()
            .instances
            .get(hostname)
            .map(|instance| instance.spec.clone())
    }

    /// Names of all instances, running or not, sorted.
    pub fn instance_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().instances.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn networks(&self) -> Vec<String> {
        self.state.lock().networks.iter().cloned().collect()
    }

    /// How many times `create_instance` has been called.
    pub fn create_calls(&self) -> usize {
        self.state.lock().create_calls
    }
}

#[async_trait]
impl ContainerRuntime for MemoryRuntime {
    async fn create_instance(&self, spec: &InstanceSpec) -> Result<InstanceHandle, RuntimeError> {
        let mut state = self.state.lock();
        state.create_calls += 1;
        if state.failing_creates.contains(&spec.hostname) {
            return Err(RuntimeError::Injected {
                op: "create",
                target: spec.hostname.clone(),
            });
        }
        if state.instances.contains_key(&spec.hostname) {
            return Err(RuntimeError::Conflict(spec.hostname.clone()));
        }
        state.next_id += 1;
        let id = format!("mem-{}", state.next_id);
        state.instances.insert(
            spec.hostname.clone(),
            MemoryInstance {
                id: id.clone(),
                spec: spec.clone(),
                running: false,
            },
        );
        debug!(hostname = %spec.hostname, %id, "memory instance created");
        Ok(InstanceHandle(id))
    }

    async fn start(&self, handle: &InstanceHandle) -> Result<(), RuntimeError> {
        let mut state = self.state.lock();
        let name = state
            .resolve(handle)
            .ok_or_else(|| RuntimeError::NotFound(handle.0.clone()))?;
        if state.failing_starts.contains(&name) {
            return Err(RuntimeError::Injected {
                op: "start",
                target: name,
            });
        }
        state.get_mut(handle)?.running = true;
        Ok(())
    }

    async fn stop(&self, handle: &InstanceHandle) -> Result<(), RuntimeError> {
        self.state.lock().get_mut(handle)?.running = false;
        Ok(())
    }

    async fn remove(&self, handle: &InstanceHandle) -> Result<(), RuntimeError> {
        let mut state = self.state.lock();
        let name = state
            .resolve(handle)
            .ok_or_else(|| RuntimeError::NotFound(handle.0.clone()))?;
        state.instances.remove(&name);
        Ok(())
    }

    async fn inspect(&self, handle: &InstanceHandle) -> Result<InstanceState, RuntimeError> {
        let mut state = self.state.lock();
        let instance = state.get_mut(handle)?;
        Ok(InstanceState {
            running: instance.running,
            networks: vec![instance.spec.network.clone()],
        })
    }

    async fn list_instances(
        &self,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<InstanceSummary>, RuntimeError> {
        let state = self.state.lock();
        let mut found: Vec<InstanceSummary> = state
            .instances
            .values()
            .filter(|instance| instance.running)
            .filter(|instance| {
                labels
                    .iter()
                    .all(|(k, v)| instance.spec.labels.get(k) == Some(v))
            })
            .map(|instance| InstanceSummary {
                id: instance.id.clone(),
                hostname: instance.spec.hostname.clone(),
                networks: vec![instance.spec.network.clone()],
            })
            .collect();
        found.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        Ok(found)
    }

    async fn list_networks(&self) -> Result<Vec<String>, RuntimeError> {
        Ok(self.networks())
    }

    async fn create_network(&self, name: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.lock();
        if !state.networks.insert(name.to_owned()) {
            return Err(RuntimeError::Conflict(name.to_owned()));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
