//! Startup wiring.
//!
//! Order matters: the network is ensured and the ring repopulated (or an
//! initial pool spawned) before the health monitor starts and before the
//! HTTP listener accepts anything.

use std::sync::Arc;

use corelib::{RingBuilder, SharedRing};
use orchestrator::{
    ContainerRuntime, DockerRuntime, HealthMonitor, HttpProber, MemoryRuntime,
    OrchestratorConfig, ReplicaOrchestrator,
};
use tokio::net::TcpListener;
use tracing::info;

use crate::api::{self, AppState};
use crate::config::{BalancerConfig, RuntimeKind};
use crate::router::RequestRouter;

/// Everything the balancer runs on, before it starts serving.
pub struct Balancer {
    pub state: AppState,
    pub monitor: Arc<HealthMonitor>,
}

fn build_runtime(config: &BalancerConfig) -> anyhow::Result<Arc<dyn ContainerRuntime>> {
    let runtime: Arc<dyn ContainerRuntime> = match config.runtime {
        RuntimeKind::Docker => Arc::new(DockerRuntime::new(&config.docker_host)?),
        RuntimeKind::Memory => Arc::new(MemoryRuntime::new()),
    };
    Ok(runtime)
}

impl Balancer {
    /// Build the ring and orchestrator, then bring the pool up.
    pub async fn prepare(config: &BalancerConfig) -> anyhow::Result<Self> {
        let ring = SharedRing::from(
            RingBuilder::new()
                .with_slots(config.slots)
                .with_vnodes(config.virtual_nodes)
                .build()?,
        );
        let runtime = build_runtime(config)?;
        info!(runtime = runtime.name(), "container runtime selected");

        let orchestrator = Arc::new(ReplicaOrchestrator::new(
            ring.clone(),
            runtime,
            OrchestratorConfig {
                image: config.server_image.clone(),
                network: config.network_name.clone(),
            },
        ));

        orchestrator.ensure_network().await?;
        let recovered = orchestrator.recover_from_runtime().await?;
        if recovered.is_empty() {
            let outcomes = orchestrator.bootstrap(config.initial_replicas).await;
            let spawned = outcomes.iter().filter(|o| o.is_ok()).count();
            info!(spawned, requested = config.initial_replicas, "initial replicas spawned");
        } else {
            info!(replicas = recovered.len(), "load balancer restored");
        }

        let prober = HttpProber::new(config.replica_port, config.health_check_timeout())?;
        let monitor = Arc::new(HealthMonitor::new(
            Arc::clone(&orchestrator),
            Arc::new(prober),
            config.health_check_interval(),
            config.health_check_timeout(),
        ));
        let router = RequestRouter::new(ring, config.replica_port, config.health_check_timeout())?;

        Ok(Self {
            state: AppState {
                orchestrator,
                router: Arc::new(router),
            },
            monitor,
        })
    }
}

/// Run the balancer until the listener fails.
pub async fn run(config: BalancerConfig) -> anyhow::Result<()> {
    info!(
        image = %config.server_image,
        network = %config.network_name,
        slots = config.slots,
        virtual_nodes = config.virtual_nodes,
        "starting load balancer"
    );

    let balancer = Balancer::prepare(&config).await?;
    let _monitor_handle = Arc::clone(&balancer.monitor).start();

    let listener = TcpListener::bind(config.listen).await?;
    info!(listen = %config.listen, "load balancer listening");
    axum::serve(listener, api::router(balancer.state)).await?;
    Ok(())
}
