use crate::AppState;
use axum::{Json, extract::State};
use serde::Serialize;
use std::sync::atomic::Ordering;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    /// Whether this replica is currently running the scheduler
    pub leader: bool,
}

// GET /healthz - Liveness of the monitor itself
pub async fn healthz(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        leader: state.is_leader.load(Ordering::Relaxed),
    })
}
