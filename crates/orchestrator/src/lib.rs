//! Replica lifecycle for the slot-ring load balancer.
//!
//! This crate owns every mutation of the ring:
//! - How replicas are created and destroyed (through a [`ContainerRuntime`])
//! - How ring membership is rebuilt from the runtime after a restart
//! - How unresponsive replicas are detected and replaced ([`health`])

pub mod error;
pub mod health;
pub mod inflight;
pub mod orchestrator;
pub mod runtime;

pub use error::OrchestratorError;
pub use health::{CycleReport, HealthMonitor, HttpProber, ProbeError, Prober};
pub use inflight::{InFlight, InFlightGuard};
pub use orchestrator::{
    DecommissionOutcome, OrchestratorConfig, ReplicaOrchestrator, ReplicaOutcome, SpawnOutcome,
};
pub use runtime::{ContainerRuntime, DockerRuntime, MemoryRuntime, RuntimeError};
