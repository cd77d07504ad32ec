//! Periodic liveness checks and self-healing.
//!
//! Every cycle snapshots the ring's replica list, probes each replica that is
//! not already being spawned or removed, and asks the orchestrator to replace
//! the ones that fail. Failed replacements are logged and reported; nothing
//! here ever stops the loop.

pub mod probe;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::orchestrator::{ReplicaOrchestrator, SpawnOutcome};

pub use probe::{HttpProber, ProbeError, Prober};

/// What one health cycle found and did. Each list is sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub healthy: Vec<String>,
    pub replaced: Vec<String>,
    /// Unresponsive replicas whose replacement failed.
    pub failed: Vec<String>,
    /// Replicas not probed because an operation on them was in flight, or
    /// not replaced because they left the ring while being probed.
    pub skipped: Vec<String>,
}

impl CycleReport {
    pub fn unresponsive(&self) -> usize {
        self.replaced.len() + self.failed.len()
    }
}

/// Drives health cycles against one orchestrator.
pub struct HealthMonitor {
    orchestrator: Arc<ReplicaOrchestrator>,
    prober: Arc<dyn Prober>,
    interval: Duration,
    timeout: Duration,
}

impl HealthMonitor {
    pub fn new(
        orchestrator: Arc<ReplicaOrchestrator>,
        prober: Arc<dyn Prober>,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            orchestrator,
            prober,
            interval,
            timeout,
        }
    }

    /// Run one probe-and-replace cycle.
    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();
        let replicas = self.orchestrator.ring().list_replicas();

        let mut probes = JoinSet::new();
        for hostname in replicas {
            if self.orchestrator.inflight().contains(&hostname) {
                debug!(%hostname, "skipping probe, operation in flight");
                report.skipped.push(hostname);
                continue;
            }
            let prober = Arc::clone(&self.prober);
            let timeout = self.timeout;
            probes.spawn(async move {
                let result = match time::timeout(timeout, prober.probe(&hostname)).await {
                    Ok(result) => result,
                    Err(_) => Err(ProbeError::Timeout(timeout)),
                };
                (hostname, result)
            });
        }

        let mut unresponsive = Vec::new();
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok((hostname, Ok(()))) => report.healthy.push(hostname),
                Ok((hostname, Err(err))) => {
                    warn!(%hostname, error = %err, "replica unresponsive");
                    unresponsive.push(hostname);
                }
                Err(err) => error!(error = %err, "probe task failed"),
            }
        }

        let replacements = unresponsive.into_iter().map(|hostname| async move {
            let result = self.orchestrator.replace_replica(&hostname).await;
            (hostname, result)
        });
        for (hostname, result) in join_all(replacements).await {
            match result {
                Ok(SpawnOutcome::NotRegistered) => {
                    debug!(%hostname, "removed while probing, not replacing");
                    report.skipped.push(hostname);
                }
                Ok(SpawnOutcome::RingFull) => {
                    error!(%hostname, "no room on the ring for replacement");
                    report.failed.push(hostname);
                }
                Ok(outcome) => {
                    info!(%hostname, ?outcome, "replaced unresponsive replica");
                    report.replaced.push(hostname);
                }
                Err(err) => {
                    error!(%hostname, error = %err, "failed to replace replica");
                    report.failed.push(hostname);
                }
            }
        }

        report.healthy.sort();
        report.replaced.sort();
        report.failed.sort();
        report.skipped.sort();
        report
    }

    /// Run cycles forever on a background task, first one after one
    /// interval. Ticks missed by a slow cycle are skipped.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(interval = ?self.interval, timeout = ?self.timeout, "health monitor started");
            loop {
                ticker.tick().await;
                let report = self.run_cycle().await;
                if report.unresponsive() > 0 {
                    info!(
                        healthy = report.healthy.len(),
                        replaced = report.replaced.len(),
                        failed = report.failed.len(),
                        skipped = report.skipped.len(),
                        "health cycle finished"
                    );
                } else {
                    debug!(
                        healthy = report.healthy.len(),
                        skipped = report.skipped.len(),
                        "health cycle finished"
                    );
                }
            }
        })
    }
}
