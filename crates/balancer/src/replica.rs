//! The backend server each replica instance runs.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// Build the replica router for the server identified as `server_id`.
pub fn router(server_id: impl Into<String>) -> Router {
    let server_id: Arc<str> = Arc::from(server_id.into());
    Router::new()
        .route("/home", get(home))
        .route("/heartbeat", get(heartbeat))
        .with_state(server_id)
}

async fn home(State(server_id): State<Arc<str>>) -> Json<Value> {
    info!(%server_id, "request received for /home");
    Json(json!({
        "message": format!("Hello from Server: {}", server_id),
        "status": "successful",
    }))
}

async fn heartbeat() -> StatusCode {
    StatusCode::OK
}
