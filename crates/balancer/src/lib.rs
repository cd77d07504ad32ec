//! HTTP front end of the slot-ring load balancer.
//!
//! Provides:
//! - Configuration from flags and environment
//! - The management and routing API
//! - Request forwarding to replicas
//! - The replica server the balancer spawns
//! - Startup wiring

pub mod api;
pub mod app;
pub mod config;
pub mod hostnames;
pub mod replica;
pub mod router;
pub mod trace;

pub use api::{ApiError, AppState};
pub use config::{BalancerConfig, RuntimeKind};
pub use router::{Forwarded, RequestRouter, RouteError};
