//! HTTP API.
//!
//! - **[`handlers`]**: axum route handlers
//! - **[`models`]**: the response envelope and query parameters
//!
//! Routes live under `/api/v1`:
//!
//! - `POST /ping/trigger`: run one due batch (shared `x-api-key`, for external cron)
//! - `POST /services/ping`: ping all of the caller's services
//! - `POST /services/{id}/ping`: ping one of the caller's services
//! - `GET /services/{id}/pings`: the caller's ping history for a service
//!
//! `GET /healthz` sits at the root.

pub mod handlers;
pub mod models;
