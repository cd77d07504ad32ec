//! Liveness probes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

/// Why a replica failed its probe.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("heartbeat request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("heartbeat returned {0}")]
    Status(StatusCode),

    #[error("heartbeat timed out after {0:?}")]
    Timeout(Duration),
}

/// Checks whether one replica is alive.
#[async_trait]
pub trait Prober: Send + Sync + 'static {
    async fn probe(&self, hostname: &str) -> Result<(), ProbeError>;
}

/// Probes `GET http://{hostname}:{port}/heartbeat`; only a 200 is healthy.
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: reqwest::Client,
    port: u16,
}

impl HttpProber {
    pub fn new(port: u16, timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, port })
    }

    fn url(&self, hostname: &str) -> String {
        format!("http://{}:{}/heartbeat", hostname, self.port)
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, hostname: &str) -> Result<(), ProbeError> {
        let response = self.client.get(self.url(hostname)).send().await?;
        match response.status() {
            StatusCode::OK => Ok(()),
            other => Err(ProbeError::Status(other)),
        }
    }
}
