//! Routing client requests to replicas.
//!
//! Each request gets a random routing key; the ring maps the key to a
//! replica and the request is forwarded there unchanged. Forwarding never
//! touches the ring: an unreachable replica is the health monitor's problem.

use std::time::Duration;

use corelib::SharedRing;
use rand::Rng;
use serde_json::Value;
use tracing::{debug, warn};

/// Routing keys are drawn from `0..ROUTING_KEY_SPACE`.
pub const ROUTING_KEY_SPACE: u64 = 100_000;

/// Errors from routing a request.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("No available servers")]
    NoAvailableServers,

    #[error("Error forwarding request to {hostname}")]
    Forward {
        hostname: String,
        #[source]
        source: reqwest::Error,
    },
}

/// A replica's answer, relayed as-is.
#[derive(Debug, Clone)]
pub struct Forwarded {
    pub hostname: String,
    pub status: u16,
    pub body: Value,
}

/// Picks a replica per request and forwards to it.
#[derive(Debug, Clone)]
pub struct RequestRouter {
    ring: SharedRing,
    client: reqwest::Client,
    port: u16,
}

impl RequestRouter {
    pub fn new(ring: SharedRing, port: u16, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { ring, client, port })
    }

    pub fn random_key() -> u64 {
        rand::thread_rng().gen_range(0..ROUTING_KEY_SPACE)
    }

    /// Replica responsible for `key`.
    pub fn pick(&self, key: u64) -> Result<String, RouteError> {
        self.ring
            .get_server(key)
            .map_err(|_| RouteError::NoAvailableServers)
    }

    /// Forward `GET {path}` to the replica chosen for a random key.
    pub async fn forward(&self, path: &str) -> Result<Forwarded, RouteError> {
        self.forward_with_key(Self::random_key(), path).await
    }

    pub async fn forward_with_key(&self, key: u64, path: &str) -> Result<Forwarded, RouteError> {
        let hostname = match self.pick(key) {
            Ok(hostname) => hostname,
            Err(err) => {
                metrics::counter!("balancer_requests_unroutable").increment(1);
                return Err(err);
            }
        };
        debug!(key, %hostname, path, "routing request");

        let url = format!("http://{}:{}{}", hostname, self.port, path);
        match self.relay(&url).await {
            Ok((status, body)) => {
                metrics::counter!("balancer_requests_routed").increment(1);
                Ok(Forwarded {
                    hostname,
                    status,
                    body,
                })
            }
            Err(source) => {
                warn!(%hostname, error = %source, "error forwarding request");
                metrics::counter!("balancer_forward_errors").increment(1);
                Err(RouteError::Forward { hostname, source })
            }
        }
    }

    async fn relay(&self, url: &str) -> Result<(u16, Value), reqwest::Error> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let status = response.status().as_u16();
        let body = response.json::<Value>().await?;
        Ok((status, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corelib::{ServerId, SlotRing};

    #[test]
    fn test_random_key_in_range() {
        for _ in 0..1000 {
            assert!(RequestRouter::random_key() < ROUTING_KEY_SPACE);
        }
    }

    #[test]
    fn test_pick_matches_ring() {
        let ring = SharedRing::new(SlotRing::new(512, 9).unwrap());
        let router = RequestRouter::new(ring.clone(), 5000, Duration::from_secs(1)).unwrap();
        assert!(matches!(router.pick(7), Err(RouteError::NoAvailableServers)));

        for name in ["server-0", "server-1", "server-2"] {
            ring.write()
                .add_server(name, ServerId::from_hostname(name))
                .unwrap();
        }
        for key in [0, 1, 42, 99_999] {
            assert_eq!(router.pick(key).unwrap(), ring.get_server(key).unwrap());
        }
    }
}
