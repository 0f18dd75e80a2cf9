use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    routing::{get, post},
};
use serde::Serialize;
use std::time::Instant;

use common::error::ApiError;
use common::schemas::{Reply, Request};

use crate::core::coordinator::{FileSnapshot, NodeSnapshot, PerformanceReport};
use crate::core::debug::debug_placement;
use crate::core::recovery::FileRecovery;
use crate::core::state::CoordinatorState;

#[derive(Debug, Serialize)]
pub struct RepairResponse {
    pub checked: usize,
    pub files: Vec<FileRecovery>,
}

pub fn admin_router(state: CoordinatorState) -> Router {
    Router::new()
        .route("/admin/nodes", get(list_nodes))
        .route("/admin/files", get(list_files))
        .route("/admin/performance", get(performance))
        .route("/admin/repair", post(repair))
        .route("/rpc", post(rpc))
        .route("/debug/placement/{file_id}", get(debug_placement))
        .with_state(state)
}

// GET /admin/nodes
#[tracing::instrument(name = "coord.admin.nodes", skip(ctx))]
pub async fn list_nodes(
    State(ctx): State<CoordinatorState>,
) -> Result<Json<Vec<NodeSnapshot>>, ApiError> {
    Ok(Json(ctx.with(|c| c.node_snapshots())?))
}

// GET /admin/files
#[tracing::instrument(name = "coord.admin.files", skip(ctx))]
pub async fn list_files(
    State(ctx): State<CoordinatorState>,
) -> Result<Json<Vec<FileSnapshot>>, ApiError> {
    Ok(Json(ctx.with(|c| c.file_snapshots())?))
}

// GET /admin/performance
#[tracing::instrument(name = "coord.admin.performance", skip(ctx))]
pub async fn performance(
    State(ctx): State<CoordinatorState>,
) -> Result<Json<PerformanceReport>, ApiError> {
    Ok(Json(ctx.with(|c| c.performance_report())?))
}

// POST /admin/repair
/// Re-checks every file against the replication factor.
#[tracing::instrument(name = "coord.admin.repair", skip(ctx))]
pub async fn repair(State(ctx): State<CoordinatorState>) -> Result<Json<RepairResponse>, ApiError> {
    let files = ctx.with(|c| c.repair_all())?;

    Ok(Json(RepairResponse {
        checked: files.len(),
        files,
    }))
}

// POST /rpc
/// Same tagged requests as the TCP protocol, for tools that speak HTTP.
#[tracing::instrument(name = "coord.rpc", skip(ctx, body))]
pub async fn rpc(State(ctx): State<CoordinatorState>, body: Bytes) -> Result<Json<Reply>, ApiError> {
    let req: Request = serde_json::from_slice(&body)?;
    let reply = ctx.with(|c| c.dispatch(req, Instant::now()))??;
    Ok(Json(reply))
}
