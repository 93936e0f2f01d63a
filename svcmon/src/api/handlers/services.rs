use crate::AppState;
use crate::api::models::ApiResponse;
use crate::api::models::pings::{
    DEFAULT_HISTORY_LIMIT, HistoryQuery, MAX_HISTORY_LIMIT, ProtocolQuery, parse_count, parse_protocol,
};
use crate::auth::CurrentUser;
use crate::db::models::PingRecord;
use crate::errors::Error;
use crate::monitor::BatchSummary;
use crate::ping::PingResult;
use crate::types::ServiceId;
use axum::{
    Json,
    extract::{Path, Query, State},
};

// POST /services/ping - Ping every service the user owns, optionally one protocol only
pub async fn ping_my_services(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<ProtocolQuery>,
) -> Result<Json<ApiResponse<BatchSummary>>, Error> {
    let protocol = parse_protocol(query.protocol.as_deref())?;
    let summary = state.ping_service.ping_user_services(user.id, protocol).await?;

    if summary.total == 0 {
        let scope = protocol.map(|p| format!(" {p}")).unwrap_or_default();
        return Ok(Json(ApiResponse::info(
            "No services found",
            format!("You have no{scope} services to ping"),
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

// POST /services/{id}/ping - Ping one service the user owns
pub async fn ping_service(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<ServiceId>,
) -> Result<Json<ApiResponse<PingResult>>, Error> {
    let result = state.ping_service.ping_service_for_user(user.id, id).await?;

    let response = if result.successful {
        let message = match result.response_time_ms {
            Some(ms) => format!("Service responded in {ms}ms"),
            None => "Service responded".to_string(),
        };
        ApiResponse::success("Service is online", message, result)
    } else {
        let message = result.error_message.clone().unwrap_or_else(|| "Ping failed".to_string());
        ApiResponse::info("Service is offline", message, Some(result))
    };

    Ok(Json(response))
}

// GET /services/{id}/pings - Recent ping history, newest first
pub async fn list_service_pings(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<ServiceId>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ApiResponse<Vec<PingRecord>>>, Error> {
    let limit = parse_count("limit", query.limit.as_deref(), DEFAULT_HISTORY_LIMIT)?;
    if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
        return Err(Error::BadRequest {
            message: format!("limit must be between 1 and {MAX_HISTORY_LIMIT}, got {limit}"),
        });
    }

    let records = state.ping_service.ping_history(user.id, id, limit).await?;
    let message = format!("{} pings", records.len());
    Ok(Json(ApiResponse::success("Ping history", message, records)))
}
