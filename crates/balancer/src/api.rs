//! HTTP API.
//!
//! Management endpoints (`/rep`, `/add`, `/rm`, `/function`) plus the routed
//! `/home`. Every response is JSON of the form
//! `{"message": ..., "status": "successful" | "failure"}`.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use corelib::HashMode;
use orchestrator::ReplicaOrchestrator;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::hostnames::{hostnames_to_add, hostnames_to_remove};
use crate::router::{RequestRouter, RouteError};

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ReplicaOrchestrator>,
    pub router: Arc<RequestRouter>,
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/rep", get(list_replicas))
        .route("/add", post(add_replicas))
        .route("/rm", delete(remove_replicas))
        .route("/function", post(set_hash_function))
        .route("/home", get(home))
        .fallback(unknown_endpoint)
        .with_state(state)
}

// ==================== Response types ====================

const SUCCESSFUL: &str = "successful";
const FAILURE: &str = "failure";

#[derive(Serialize)]
struct ApiResponse<T> {
    message: T,
    status: &'static str,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(message: T) -> Json<Self> {
        Json(Self {
            message,
            status: SUCCESSFUL,
        })
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ReplicaList {
    #[serde(rename = "N")]
    pub n: usize,
    pub replicas: Vec<String>,
}

impl ReplicaList {
    fn new(replicas: Vec<String>) -> Self {
        Self {
            n: replicas.len(),
            replicas,
        }
    }
}

// ==================== Request types ====================

#[derive(Deserialize)]
struct ScaleRequest {
    n: Option<usize>,
    hostnames: Option<Vec<String>>,
}

impl ScaleRequest {
    /// `n` and `hostnames` both present and `n` non-zero.
    fn validate(self) -> Result<(usize, Vec<String>), ApiError> {
        match (self.n, self.hostnames) {
            (Some(n), Some(hostnames)) if n > 0 => Ok((n, hostnames)),
            _ => Err(ApiError::InvalidPayload),
        }
    }
}

// ==================== Errors ====================

/// Errors returned to API clients.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("<Error> Invalid payload")]
    InvalidPayload,

    #[error("<Error> Length of hostname list is more than newly added instances")]
    TooManyHostnamesToAdd,

    #[error("<Error> Length of hostname list is more than number of instances to remove")]
    TooManyHostnamesToRemove,

    #[error("<Error> Length of hostname list is more than removable instances")]
    NotEnoughReplicas,

    #[error("<Error> 'useDefault' must be a boolean")]
    NotABoolean,

    #[error("<Error> '{0}' endpoint does not exist in server replicas")]
    UnknownEndpoint(String),

    #[error(transparent)]
    Route(#[from] RouteError),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Route(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(_: JsonRejection) -> Self {
        ApiError::InvalidPayload
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse {
            message: self.to_string(),
            status: FAILURE,
        };
        (self.status_code(), Json(body)).into_response()
    }
}

// ==================== Handlers ====================

async fn list_replicas(State(state): State<AppState>) -> Json<ApiResponse<ReplicaList>> {
    ApiResponse::ok(ReplicaList::new(state.orchestrator.ring().list_replicas()))
}

async fn add_replicas(
    State(state): State<AppState>,
    payload: Result<Json<ScaleRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<ReplicaList>>, ApiError> {
    let Json(request) = payload?;
    let (n, requested) = request.validate()?;
    if n < requested.len() {
        return Err(ApiError::TooManyHostnamesToAdd);
    }

    let hostnames = hostnames_to_add(&requested, n);
    info!(n, hostnames = ?hostnames, "adding replicas");
    // per-hostname failures are logged by the orchestrator
    state.orchestrator.scale_up(hostnames).await;

    Ok(ApiResponse::ok(ReplicaList::new(
        state.orchestrator.ring().list_replicas(),
    )))
}

async fn remove_replicas(
    State(state): State<AppState>,
    payload: Result<Json<ScaleRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<ReplicaList>>, ApiError> {
    let Json(request) = payload?;
    let (n, requested) = request.validate()?;
    if n < requested.len() {
        return Err(ApiError::TooManyHostnamesToRemove);
    }
    let current = state.orchestrator.ring().list_replicas();
    if n > current.len() {
        return Err(ApiError::NotEnoughReplicas);
    }

    let hostnames = hostnames_to_remove(&requested, &current, n);
    info!(n, hostnames = ?hostnames, "removing replicas");
    state.orchestrator.scale_down(hostnames).await;

    Ok(ApiResponse::ok(ReplicaList::new(
        state.orchestrator.ring().list_replicas(),
    )))
}

async fn set_hash_function(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ApiResponse<String>>, ApiError> {
    let Json(body) = payload?;
    let use_default = match body.get("useDefault") {
        None => return Err(ApiError::InvalidPayload),
        Some(Value::Bool(flag)) => *flag,
        Some(_) => return Err(ApiError::NotABoolean),
    };

    let mode = HashMode::from_use_default(use_default);
    state.orchestrator.rehash_all(mode);
    Ok(ApiResponse::ok(format!("Hash function set to {}", mode.label())))
}

async fn home(State(state): State<AppState>) -> Result<Response, ApiError> {
    let forwarded = state.router.forward("/home").await?;
    let status = StatusCode::from_u16(forwarded.status).unwrap_or(StatusCode::OK);
    Ok((status, Json(forwarded.body)).into_response())
}

async fn unknown_endpoint(method: Method, uri: Uri) -> Response {
    if method == Method::GET {
        ApiError::UnknownEndpoint(uri.path().to_owned()).into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}
