//! `GET /healthz` — not part of the PDP/PAP callable surface, just enough
//! for an operator (or a container orchestrator) to tell this process is up
//! and the store is seeded.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::SharedState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub seeded: bool,
    pub cache_enabled: bool,
}

pub async fn healthz(State(state): State<SharedState>) -> Json<HealthResponse> {
    let seeded = state.store.backend().all_grants().await.map(|rows| !rows.is_empty()).unwrap_or(false);
    Json(HealthResponse { status: "ok", seeded, cache_enabled: state.store.cache_config().enabled })
}
