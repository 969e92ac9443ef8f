use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    error::{ApiError, ApiResult},
    models::Fund,
    services::{fund_service, report_service},
    AppState,
};

pub fn fund_json(f: &Fund) -> Value {
    json!({
        "ticker": f.ticker,
        "name": f.name,
        "last_price": f.last_price,
        "last_variation": f.last_variation,
        "updated_at": f.updated_at,
    })
}

#[derive(Deserialize)]
pub struct FundsQuery {
    pub q: Option<String>,
}

// GET /api/funds?q=
pub async fn get_funds(
    State(state): State<AppState>,
    Query(query): Query<FundsQuery>,
) -> ApiResult<Json<Value>> {
    let funds = fund_service::list_funds(&state, query.q.as_deref())
        .await
        .map_err(ApiError::Internal)?;

    let items: Vec<Value> = funds.iter().map(fund_json).collect();
    Ok(Json(json!({ "funds": items })))
}

// GET /api/funds/:ticker
pub async fn get_fund(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> ApiResult<Json<Value>> {
    let Some(ticker) = fund_service::normalize_ticker(&ticker) else {
        return Err(ApiError::BadRequest("Invalid FII ticker.".to_string()));
    };

    let fund = fund_service::get_fund(&state, &ticker)
        .await
        .map_err(ApiError::Internal)?
        .ok_or_else(|| ApiError::NotFound(format!("Fund {ticker}")))?;

    let reports = report_service::list_reports(&state, &ticker, 10)
        .await
        .map_err(ApiError::Internal)?;
    let dividends = report_service::list_dividends(&state, &ticker, 12)
        .await
        .map_err(ApiError::Internal)?;

    let reports: Vec<Value> = reports
        .into_iter()
        .map(|r| json!({ "kind": r.kind, "title": r.title, "url": r.url, "reference_date": r.reference_date }))
        .collect();
    let dividends: Vec<Value> = dividends
        .into_iter()
        .map(|d| json!({ "amount": d.amount, "record_date": d.record_date, "payment_date": d.payment_date }))
        .collect();

    Ok(Json(json!({
        "fund": fund_json(&fund),
        "reports": reports,
        "dividends": dividends,
    })))
}
