//! `/_/health`, `/_/live`, `/_/ready` (spec §6), grounded on
//! `r2e-core/src/health.rs`'s liveness/readiness split.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;

use crate::state::DispatchState;

pub fn router() -> Router<DispatchState> {
    Router::new()
        .route("/health", get(health))
        .route("/live", get(live))
        .route("/ready", get(ready))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn live() -> StatusCode {
    StatusCode::OK
}

async fn ready(State(state): State<DispatchState>) -> StatusCode {
    if state.pool.has_capacity() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
