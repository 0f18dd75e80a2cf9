use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};

use crate::core::state::CoordinatorState;
use common::error::ApiError;

#[derive(Debug, Serialize, Deserialize)]
pub struct PlacementCandidate {
    pub node_id: String,
    pub score: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PlacementResponse {
    pub file_id: String,
    pub replicas: Vec<String>,
    pub candidates: Vec<PlacementCandidate>,
}

/// GET /debug/placement/{file_id} -> current replicas plus the ranked nodes
/// that would receive the next copy.
#[tracing::instrument(name = "coord.debug.placement", skip(ctx))]
pub async fn debug_placement(
    Path(file_id): Path<String>,
    State(ctx): State<CoordinatorState>,
) -> Result<axum::Json<PlacementResponse>, ApiError> {
    let (replicas, ranked) = ctx.with(|c| {
        let ranked = c.rank_placement(&file_id)?;
        let replicas = c
            .catalog()
            .get(&file_id)
            .map(|f| f.replica_nodes.iter().cloned().collect())
            .unwrap_or_default();
        Ok::<_, ApiError>((replicas, ranked))
    })??;

    let candidates = ranked
        .into_iter()
        .map(|n| PlacementCandidate {
            node_id: n.node_id,
            score: n.score,
        })
        .collect();

    Ok(axum::Json(PlacementResponse {
        file_id,
        replicas,
        candidates,
    }))
}
