use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::{repo, state::AppState};

#[derive(Serialize)]
pub struct StatusResponse {
    pub status: String,
}

/// `GET /` — liveness plus a check of the backing store's dependencies.
pub async fn root(State(state): State<AppState>) -> Json<StatusResponse> {
    let health = repo::health(&state.pool).await;
    let status = if health.ok { "ready".to_owned() } else { health.detail };
    Json(StatusResponse { status })
}

/// `GET /ping` — static liveness, no dependency checks.
pub async fn ping() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "alive".to_owned(),
    })
}
