use crate::AppState;
use crate::api::models::ApiResponse;
use crate::api::models::pings::{TriggerQuery, parse_count, parse_protocol};
use crate::auth::TriggerKey;
use crate::errors::Error;
use crate::monitor::BatchSummary;
use axum::{
    Json,
    extract::{Query, State},
};
use tracing::instrument;

// POST /ping/trigger - Ping one batch of services that are due for a check
#[instrument(skip_all)]
pub async fn trigger_ping_batch(
    State(state): State<AppState>,
    _: TriggerKey,
    Query(query): Query<TriggerQuery>,
) -> Result<Json<ApiResponse<BatchSummary>>, Error> {
    let batch_size = parse_count("batchSize", query.batch_size.as_deref(), state.config.trigger.default_batch_size)?;
    let protocol = parse_protocol(query.protocol.as_deref())?;

    let summary = state.ping_service.run_due_batch(batch_size, protocol).await?;

    if summary.total == 0 {
        return Ok(Json(ApiResponse::info(
            "No services to ping",
            "No services are due for a check",
            Some(summary),
        )));
    }

    Ok(Json(ApiResponse::success(
        "Ping processing complete",
        format!(
            "Pinged {} services: {} successful, {} failed",
            summary.total, summary.successful, summary.failed
        ),
        summary,
    )))
}
