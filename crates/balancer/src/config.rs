//! Balancer configuration.
//!
//! Every option can be given as a flag or through the environment variable
//! named next to it.

use std::net::SocketAddr;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use corelib::ring::{DEFAULT_NUM_SLOTS, DEFAULT_VIRTUAL_NODES};
use orchestrator::runtime::docker::DEFAULT_ENDPOINT;

/// Which container runtime replicas are created in.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum RuntimeKind {
    /// Docker Engine API.
    Docker,
    /// In-process instances, nothing is actually started.
    Memory,
}

/// Slot-ring load balancer
#[derive(Parser, Debug, Clone)]
#[command(name = "balancer")]
#[command(about = "Consistent-hashing load balancer over a pool of container replicas")]
pub struct BalancerConfig {
    /// HTTP listen address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:5000")]
    pub listen: SocketAddr,

    /// Image every replica runs
    #[arg(long, env = "SERVER_IMAGE", default_value = "server-replica:latest")]
    pub server_image: String,

    /// Private network replicas attach to
    #[arg(long, env = "DOCKER_NETWORK_NAME", default_value = "load-balancer-net")]
    pub network_name: String,

    /// Replicas to spawn when none are recovered
    #[arg(long, env = "INITIAL_REPLICA_COUNT", default_value_t = 3)]
    pub initial_replicas: usize,

    /// Milliseconds between health cycles
    #[arg(long, env = "HEALTH_CHECK_INTERVAL", default_value_t = 20_000)]
    pub health_check_interval_ms: u64,

    /// Milliseconds before a heartbeat counts as failed
    #[arg(long, env = "HEALTH_CHECK_TIMEOUT", default_value_t = 10_000)]
    pub health_check_timeout_ms: u64,

    /// Slots in the hash ring
    #[arg(long, env = "HASHMAP_SLOTS", default_value_t = DEFAULT_NUM_SLOTS)]
    pub slots: usize,

    /// Virtual nodes per replica
    #[arg(long, env = "VIRTUAL_SERVER_COUNT", default_value_t = DEFAULT_VIRTUAL_NODES)]
    pub virtual_nodes: usize,

    /// Port replicas listen on
    #[arg(long, env = "REPLICA_PORT", default_value_t = 5000)]
    pub replica_port: u16,

    /// Container runtime
    #[arg(long, env = "RUNTIME", value_enum, default_value_t = RuntimeKind::Docker)]
    pub runtime: RuntimeKind,

    /// Docker Engine endpoint: `unix:///path/to.sock` or `tcp://host:port`
    #[arg(long, env = "DOCKER_HOST", default_value = DEFAULT_ENDPOINT)]
    pub docker_host: String,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl BalancerConfig {
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_millis(self.health_check_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BalancerConfig::try_parse_from(["balancer"]).unwrap();
        assert_eq!(config.listen, "0.0.0.0:5000".parse().unwrap());
        assert_eq!(config.initial_replicas, 3);
        assert_eq!(config.health_check_interval(), Duration::from_secs(20));
        assert_eq!(config.health_check_timeout(), Duration::from_secs(10));
        assert_eq!(config.slots, 512);
        assert_eq!(config.virtual_nodes, 9);
        assert_eq!(config.replica_port, 5000);
    }

    #[test]
    fn test_flags_override() {
        let config = BalancerConfig::try_parse_from([
            "balancer",
            "--runtime",
            "memory",
            "--slots",
            "128",
            "--virtual-nodes",
            "4",
            "--docker-host",
            "tcp://10.0.0.5:2375",
        ])
        .unwrap();
        assert_eq!(config.runtime, RuntimeKind::Memory);
        assert_eq!(config.docker_host, "tcp://10.0.0.5:2375");
        assert_eq!(config.slots, 128);
        assert_eq!(config.virtual_nodes, 4);
    }
}
