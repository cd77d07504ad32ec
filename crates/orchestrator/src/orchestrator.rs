//! Replica orchestrator: the only writer of the ring.
//!
//! Runtime calls (create, start, stop, remove) happen outside the ring lock.
//! The ring is locked only for the final register/unregister step, and for
//! the whole of a rehash. Ring guards are always dropped before the next
//! `.await`.
//!
//! # Ordering
//!
//! - spawn: create → start → register. A replica is routable only once its
//!   instance is confirmed started.
//! - decommission: unregister → stop → remove. No new request is routed to a
//!   replica while it is being torn down.

use std::sync::Arc;

use corelib::{Error as RingError, HashMode, ServerId, SharedRing};
use futures::future::join_all;
use tracing::{debug, error, info, instrument, warn};

use crate::error::OrchestratorError;
use crate::inflight::{InFlight, InFlightGuard};
use crate::runtime::{ownership_labels, ContainerRuntime, InstanceHandle, InstanceSpec};

/// Settings for the instances the orchestrator creates.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Image every replica runs.
    pub image: String,
    /// Private network replicas attach to.
    pub network: String,
}

/// What a spawn attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnOutcome {
    /// A new instance is running and registered.
    Spawned {
        server_id: ServerId,
        instance: InstanceHandle,
    },
    /// The hostname was already on the ring; nothing was created.
    AlreadyRegistered,
    /// No room on the ring; nothing was left behind in the runtime.
    RingFull,
    /// A replacement found the hostname already gone from the ring, removed
    /// by a scale-down that finished first. Nothing was created.
    NotRegistered,
}

/// What a decommission did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecommissionOutcome {
    /// Whether the hostname was on the ring before the call.
    pub was_registered: bool,
}

/// Result for one hostname of a batch operation.
#[derive(Debug)]
pub struct ReplicaOutcome<T> {
    pub hostname: String,
    pub result: Result<T, OrchestratorError>,
}

impl<T> ReplicaOutcome<T> {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Keeps ring membership and runtime instances in step.
pub struct ReplicaOrchestrator {
    ring: SharedRing,
    runtime: Arc<dyn ContainerRuntime>,
    inflight: InFlight,
    config: OrchestratorConfig,
}

impl ReplicaOrchestrator {
    pub fn new(
        ring: SharedRing,
        runtime: Arc<dyn ContainerRuntime>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            ring,
            runtime,
            inflight: InFlight::new(),
            config,
        }
    }

    /// Read handle on the ring this orchestrator manages.
    pub fn ring(&self) -> &SharedRing {
        &self.ring
    }

    pub fn inflight(&self) -> &InFlight {
        &self.inflight
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    fn instance_spec(&self, hostname: &str) -> InstanceSpec {
        InstanceSpec {
            image: self.config.image.clone(),
            hostname: hostname.to_owned(),
            env: vec![format!("SERVER_ID={}", hostname)],
            network: self.config.network.clone(),
            labels: ownership_labels(),
        }
    }

    /// Make sure the private network exists. Returns true if it was created.
    #[instrument(name = "ReplicaOrchestrator::ensure_network", skip(self), fields(network = %self.config.network))]
    pub async fn ensure_network(&self) -> Result<bool, OrchestratorError> {
        let networks = self
            .runtime
            .list_networks()
            .await
            .map_err(OrchestratorError::Query)?;
        if networks.iter().any(|name| *name == self.config.network) {
            info!("network already exists");
            return Ok(false);
        }
        self.runtime
            .create_network(&self.config.network)
            .await
            .map_err(OrchestratorError::Query)?;
        info!("network created");
        Ok(true)
    }

    /// Create, start and register a replica.
    ///
    /// A full ring is reported as [`SpawnOutcome::RingFull`] before the
    /// runtime is contacted. If the instance cannot be started it is removed
    /// again, and if the ring filled up while it was starting it is torn
    /// down, so no runtime resource outlives a failed spawn.
    #[instrument(name = "ReplicaOrchestrator::spawn", skip(self))]
    pub async fn spawn_replica(&self, hostname: &str) -> Result<SpawnOutcome, OrchestratorError> {
        {
            let ring = self.ring.read();
            if ring.contains(hostname) {
                debug!("already registered");
                return Ok(SpawnOutcome::AlreadyRegistered);
            }
            if !ring.has_capacity() {
                warn!(
                    slots = ring.num_slots(),
                    replicas = ring.len(),
                    "cannot spawn: hash ring is full"
                );
                return Ok(SpawnOutcome::RingFull);
            }
        }

        let server_id = ServerId::from_hostname(hostname);
        let spec = self.instance_spec(hostname);
        let instance = self
            .runtime
            .create_instance(&spec)
            .await
            .map_err(|source| OrchestratorError::runtime(hostname, source))?;

        if let Err(source) = self.runtime.start(&instance).await {
            self.discard(hostname, &instance, false).await;
            return Err(OrchestratorError::runtime(hostname, source));
        }

        let registered = self.ring.write().add_server(hostname, server_id);
        match registered {
            Ok(_) => {}
            Err(RingError::RingFull { .. }) => {
                warn!("hash ring filled while spawning, tearing instance down");
                self.discard(hostname, &instance, true).await;
                return Ok(SpawnOutcome::RingFull);
            }
            Err(other) => {
                self.discard(hostname, &instance, true).await;
                return Err(other.into());
            }
        }

        match self.runtime.inspect(&instance).await {
            Ok(state) => info!(
                %server_id,
                networks = ?state.networks,
                "spawned and registered replica"
            ),
            Err(err) => info!(%server_id, error = %err, "spawned and registered replica"),
        }
        metrics::counter!("balancer_replicas_spawned").increment(1);
        Ok(SpawnOutcome::Spawned {
            server_id,
            instance,
        })
    }

    /// Best-effort cleanup of an instance that must not stay around.
    async fn discard(&self, hostname: &str, instance: &InstanceHandle, started: bool) {
        if started {
            if let Err(err) = self.runtime.stop(instance).await {
                warn!(hostname, error = %err, "failed to stop discarded instance");
            }
        }
        if let Err(err) = self.runtime.remove(instance).await {
            error!(hostname, error = %err, "failed to remove discarded instance");
        }
    }

    /// Unregister a replica, then stop and delete its instance.
    ///
    /// Unknown hostnames are a no-op for the ring, but the runtime cleanup is
    /// still attempted.
    #[instrument(name = "ReplicaOrchestrator::decommission", skip(self))]
    pub async fn decommission_replica(
        &self,
        hostname: &str,
    ) -> Result<DecommissionOutcome, OrchestratorError> {
        let was_registered = self.ring.write().remove_server(hostname);
        if !was_registered {
            debug!("not registered, cleaning up runtime only");
        }

        let handle = InstanceHandle::from(hostname);
        let state = self
            .runtime
            .inspect(&handle)
            .await
            .map_err(|source| OrchestratorError::runtime(hostname, source))?;
        if state.running {
            self.runtime
                .stop(&handle)
                .await
                .map_err(|source| OrchestratorError::runtime(hostname, source))?;
        }
        self.runtime
            .remove(&handle)
            .await
            .map_err(|source| OrchestratorError::runtime(hostname, source))?;

        info!(was_registered, "removed replica");
        metrics::counter!("balancer_replicas_removed").increment(1);
        Ok(DecommissionOutcome { was_registered })
    }

    /// Rebuild ring membership from the instances the runtime says we own.
    ///
    /// Returns the hostnames that were registered. An empty result means the
    /// caller should bootstrap an initial pool.
    #[instrument(name = "ReplicaOrchestrator::recover", skip(self))]
    pub async fn recover_from_runtime(&self) -> Result<Vec<String>, OrchestratorError> {
        let instances = self
            .runtime
            .list_instances(&ownership_labels())
            .await
            .map_err(OrchestratorError::Query)?;
        if instances.is_empty() {
            info!("no server replicas found to recover");
            return Ok(Vec::new());
        }
        info!(found = instances.len(), "recovering server replicas");

        let mut recovered = Vec::with_capacity(instances.len());
        let mut ring = self.ring.write();
        for instance in instances {
            let server_id = ServerId::from_hostname(&instance.hostname);
            match ring.add_server(&instance.hostname, server_id) {
                Ok(_) => {
                    info!(
                        hostname = %instance.hostname,
                        %server_id,
                        networks = ?instance.networks,
                        "recovered replica"
                    );
                    recovered.push(instance.hostname);
                }
                Err(err) => warn!(hostname = %instance.hostname, error = %err, "could not recover replica"),
            }
        }
        Ok(recovered)
    }

    /// Switch hash mode and redistribute every registered replica under it.
    ///
    /// All replicas are unregistered and then re-added in hostname order,
    /// under a single write lock, so the final layout depends only on the
    /// mode and the set of hostnames. Returns the number of replicas moved.
    #[instrument(name = "ReplicaOrchestrator::rehash", skip(self))]
    pub fn rehash_all(&self, mode: HashMode) -> usize {
        let mut ring = self.ring.write();
        ring.set_hash_mode(mode);
        let members = ring.members();
        for member in &members {
            ring.remove_server(&member.hostname);
        }
        for member in &members {
            if let Err(err) = ring.add_server(&member.hostname, member.server_id) {
                error!(hostname = %member.hostname, error = %err, "replica lost during rehash");
            }
        }
        info!(replicas = members.len(), %mode, "rehashed ring");
        debug!(layout = ?ring.layout(), "ring layout after rehash");
        members.len()
    }

    fn claim(&self, hostname: &str) -> Result<InFlightGuard, OrchestratorError> {
        self.inflight
            .try_claim(hostname)
            .ok_or_else(|| OrchestratorError::InFlight(hostname.to_owned()))
    }

    /// Spawn several replicas concurrently.
    ///
    /// Each hostname is marked in-flight while it spawns. One failure never
    /// stops the others; every hostname gets its own outcome.
    pub async fn scale_up(&self, hostnames: Vec<String>) -> Vec<ReplicaOutcome<SpawnOutcome>> {
        let spawns = hostnames.into_iter().map(|hostname| async move {
            let result = match self.claim(&hostname) {
                Ok(_guard) => self.spawn_replica(&hostname).await,
                Err(err) => Err(err),
            };
            if let Err(err) = &result {
                error!(%hostname, error = %err, "error spawning replica");
            }
            ReplicaOutcome { hostname, result }
        });
        join_all(spawns).await
    }

    /// Decommission several replicas concurrently.
    pub async fn scale_down(
        &self,
        hostnames: Vec<String>,
    ) -> Vec<ReplicaOutcome<DecommissionOutcome>> {
        let removals = hostnames.into_iter().map(|hostname| async move {
            let result = match self.claim(&hostname) {
                Ok(_guard) => self.decommission_replica(&hostname).await,
                Err(err) => Err(err),
            };
            if let Err(err) = &result {
                error!(%hostname, error = %err, "error removing replica");
            }
            ReplicaOutcome { hostname, result }
        });
        join_all(removals).await
    }

    /// Replace a replica with a fresh instance under the same hostname.
    ///
    /// Refuses with [`OrchestratorError::InFlight`] if the hostname is busy,
    /// and returns [`SpawnOutcome::NotRegistered`] if it is no longer on the
    /// ring once claimed. A failed teardown is logged and the respawn still
    /// goes ahead: the old instance is usually gone already.
    #[instrument(name = "ReplicaOrchestrator::replace", skip(self))]
    pub async fn replace_replica(&self, hostname: &str) -> Result<SpawnOutcome, OrchestratorError> {
        let _guard = self.claim(hostname)?;
        if !self.ring.contains(hostname) {
            debug!("no longer registered, nothing to replace");
            return Ok(SpawnOutcome::NotRegistered);
        }
        if let Err(err) = self.decommission_replica(hostname).await {
            warn!(error = %err, "teardown of unresponsive replica failed");
        }
        let outcome = self.spawn_replica(hostname).await?;
        metrics::counter!("balancer_replicas_replaced").increment(1);
        Ok(outcome)
    }

    /// Spawn the initial pool `server-0..server-{count-1}`, one at a time.
    pub async fn bootstrap(&self, count: usize) -> Vec<ReplicaOutcome<SpawnOutcome>> {
        let mut outcomes = Vec::with_capacity(count);
        for i in 0..count {
            let hostname = format!("server-{}", i);
            let result = match self.claim(&hostname) {
                Ok(_guard) => self.spawn_replica(&hostname).await,
                Err(err) => Err(err),
            };
            if let Err(err) = &result {
                error!(%hostname, error = %err, "error spawning initial replica");
            }
            outcomes.push(ReplicaOutcome { hostname, result });
        }
        outcomes
    }
}
