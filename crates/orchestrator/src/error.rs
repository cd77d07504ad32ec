//! Errors raised while managing replicas.

use crate::runtime::RuntimeError;

/// Errors that can occur while spawning, removing or recovering replicas.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// The container runtime refused or failed an operation.
    #[error("runtime failed while handling {hostname}: {source}")]
    Runtime {
        hostname: String,
        #[source]
        source: RuntimeError,
    },

    /// The runtime could not list managed instances or networks.
    #[error("runtime query failed: {0}")]
    Query(#[source] RuntimeError),

    /// Another spawn, removal or replacement of this hostname is underway.
    #[error("{0} is already being spawned or removed")]
    InFlight(String),

    /// The ring rejected an operation for a reason other than capacity.
    #[error("ring error: {0}")]
    Ring(#[from] corelib::Error),
}

impl OrchestratorError {
    pub(crate) fn runtime(hostname: &str, source: RuntimeError) -> Self {
        OrchestratorError::Runtime {
            hostname: hostname.to_owned(),
            source,
        }
    }
}
