use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::{
    error::{ApiError, ApiResult},
    services::{
        price_monitor,
        report_service::{self, NewDividend, NewReport},
    },
    AppState,
};

fn status_for(created: bool) -> StatusCode {
    if created { StatusCode::CREATED } else { StatusCode::OK }
}

// POST /api/documents/reports
pub async fn post_report(
    State(state): State<AppState>,
    Json(input): Json<NewReport>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let rec = report_service::record_report(&state, input).await?;
    Ok((
        status_for(rec.created),
        Json(json!({
            "ticker": rec.item.ticker,
            "created": rec.created,
            "fan_out": rec.fan_out,
        })),
    ))
}

// POST /api/documents/dividends
pub async fn post_dividend(
    State(state): State<AppState>,
    Json(input): Json<NewDividend>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let rec = report_service::record_dividend(&state, input).await?;
    Ok((
        status_for(rec.created),
        Json(json!({
            "ticker": rec.item.ticker,
            "created": rec.created,
            "fan_out": rec.fan_out,
        })),
    ))
}

// POST /api/cron/price-check
pub async fn post_price_check(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let summary = price_monitor::run_price_check(&state)
        .await
        .map_err(ApiError::Internal)?;
    Ok(Json(json!({ "summary": summary })))
}
