//! HTTP front end: binds the Access/Status/Remove operations in the spec's
//! external-interfaces surface to an `axum` router. Translates
//! [`OrchestratorError`] to status codes via its `IntoResponse` impl and
//! never contains orchestration logic itself.

use crate::error::{OrchestratorError, Result};
use crate::orchestrator::Orchestrator;
use crate::store::POOL_CLIENT_ID;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::warn;

pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/access", get(access))
        .route("/status", get(status))
        .route("/remove", get(remove))
        .route("/remove-all", get(remove_all))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(orchestrator)
}

#[derive(Debug, Deserialize)]
struct AccessQuery {
    #[serde(default)]
    id: String,
    #[serde(default)]
    width: Option<String>,
    #[serde(default)]
    height: Option<String>,
}

/// `width`/`height` are honored only when both are present; a lone value is
/// logged and dropped so the configured defaults apply to both.
fn normalize_dimensions(
    width: Option<String>,
    height: Option<String>,
) -> (Option<String>, Option<String>) {
    match (width, height) {
        (Some(w), Some(h)) => (Some(w), Some(h)),
        (None, None) => (None, None),
        _ => {
            warn!("only one of width/height supplied, falling back to configured defaults");
            (None, None)
        }
    }
}

async fn access(
    State(orchestrator): State<Arc<Orchestrator>>,
    Query(params): Query<AccessQuery>,
) -> std::result::Result<Response, OrchestratorError> {
    let (width, height) = normalize_dimensions(params.width, params.height);
    let result = orchestrator.access.access(&params.id, width, height).await?;
    Ok((
        StatusCode::FOUND,
        [(header::LOCATION, result.url)],
    )
        .into_response())
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    active_containers: usize,
    pool_containers: usize,
    max_slots: usize,
    records: Vec<crate::store::ContainerRecord>,
}

async fn status(State(orchestrator): State<Arc<Orchestrator>>) -> Json<StatusResponse> {
    let records = orchestrator.store.load_records().await;
    let pool_containers = records.iter().filter(|r| r.client_id == POOL_CLIENT_ID).count();
    let active_containers = records.len() - pool_containers;

    Json(StatusResponse {
        active_containers,
        pool_containers,
        max_slots: orchestrator.max_slots,
        records,
    })
}

#[derive(Debug, Deserialize)]
struct RemoveQuery {
    #[serde(default)]
    id: String,
}

#[derive(Debug, Serialize)]
struct RemoveResponse {
    status: &'static str,
    client_id: String,
    container_id: String,
    port: u16,
}

async fn remove(
    State(orchestrator): State<Arc<Orchestrator>>,
    Query(params): Query<RemoveQuery>,
) -> Result<Json<RemoveResponse>> {
    if params.id.is_empty() {
        return Err(OrchestratorError::BadRequest);
    }

    let (container_id, port) = orchestrator.access.remove(&params.id).await?;
    Ok(Json(RemoveResponse {
        status: "removed",
        client_id: params.id,
        container_id,
        port,
    }))
}

#[derive(Debug, Serialize)]
struct RemoveAllResponse {
    status: &'static str,
    removed: usize,
}

async fn remove_all(
    State(orchestrator): State<Arc<Orchestrator>>,
) -> Result<Json<RemoveAllResponse>> {
    let removed = orchestrator.access.remove_all().await?;
    Ok(Json(RemoveAllResponse {
        status: "removed_all",
        removed,
    }))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
