//! Debug / admin endpoints. Access is restricted to `ADMIN_EMAILS` by the auth middleware.

use axum::{
    extract::{Extension, Query, State},
    Json,
};
use mongodb::bson::oid::ObjectId;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    controllers::{funds_controller::fund_json, require_user, user_controller::user_json},
    error::{ApiError, ApiResult},
    models::CurrentUser,
    services::{
        alert_service, follow_service, fund_service, report_service, user_service,
        whatsapp::normalize_phone, whatsapp_webhooks,
    },
    AppState,
};

// GET /api/admin/users
pub async fn get_users(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let users = user_service::list_users(&state)
        .await
        .map_err(ApiError::Internal)?;

    let items: Vec<Value> = users.iter().map(user_json).collect();
    Ok(Json(json!({ "count": items.len(), "users": items })))
}

#[derive(Deserialize)]
pub struct TickerQuery {
    pub ticker: Option<String>,
}

// POST /api/admin/reports/clear?ticker=
pub async fn post_clear_reports(
    State(state): State<AppState>,
    Query(q): Query<TickerQuery>,
    user: Option<Extension<CurrentUser>>,
) -> ApiResult<Json<Value>> {
    let admin = require_user(user)?;
    let deleted = report_service::clear_reports(&state, q.ticker.as_deref())
        .await
        .map_err(ApiError::Internal)?;

    tracing::warn!(admin = %admin.email, deleted, "reports cleared by admin");
    Ok(Json(json!({ "deleted": deleted })))
}

// POST /api/admin/alerts/clear?ticker=
pub async fn post_clear_alerts(
    State(state): State<AppState>,
    Query(q): Query<TickerQuery>,
    user: Option<Extension<CurrentUser>>,
) -> ApiResult<Json<Value>> {
    let admin = require_user(user)?;
    let deleted = alert_service::clear_sent_alerts(&state, q.ticker.as_deref())
        .await
        .map_err(ApiError::Internal)?;

    tracing::warn!(admin = %admin.email, deleted, "sent-alert log cleared by admin");
    Ok(Json(json!({ "deleted": deleted })))
}

#[derive(Deserialize)]
pub struct ThresholdForm {
    pub threshold: f64,
    pub ticker: Option<String>,
    pub user_id: Option<String>,
}

// POST /api/admin/thresholds
pub async fn post_thresholds(
    State(state): State<AppState>,
    Json(form): Json<ThresholdForm>,
) -> ApiResult<Json<Value>> {
    if let Err(msg) = follow_service::validate_threshold(form.threshold) {
        return Err(ApiError::field("threshold", msg));
    }

    let user_id = match form.user_id.as_deref() {
        Some(raw) => Some(ObjectId::parse_str(raw).map_err(|_| ApiError::field("user_id", "Invalid user id."))?),
        None => None,
    };

    let modified = follow_service::update_thresholds(&state, form.ticker.as_deref(), user_id, form.threshold)
        .await
        .map_err(ApiError::Internal)?;
    Ok(Json(json!({ "modified": modified })))
}

#[derive(Deserialize)]
pub struct FundForm {
    pub ticker: String,
    pub name: String,
}

// POST /api/admin/funds
pub async fn post_fund(
    State(state): State<AppState>,
    Json(form): Json<FundForm>,
) -> ApiResult<Json<Value>> {
    let Some(ticker) = fund_service::normalize_ticker(&form.ticker) else {
        return Err(ApiError::field("ticker", "Invalid FII ticker."));
    };
    if form.name.trim().is_empty() {
        return Err(ApiError::field("name", "Name is required."));
    }

    let fund = fund_service::upsert_fund(&state, &ticker, &form.name)
        .await
        .map_err(ApiError::Internal)?;
    Ok(Json(fund_json(&fund)))
}

#[derive(Deserialize)]
pub struct TestMessageForm {
    pub phone: String,
    pub message: String,
}

// POST /api/admin/whatsapp/test
pub async fn post_test_message(
    State(state): State<AppState>,
    Json(form): Json<TestMessageForm>,
) -> ApiResult<Json<Value>> {
    let Some(phone) = normalize_phone(&form.phone) else {
        return Err(ApiError::field("phone", "Invalid phone number."));
    };
    if form.message.trim().is_empty() {
        return Err(ApiError::field("message", "Message is required."));
    }

    let res = state
        .whatsapp
        .send_text(&phone, &form.message)
        .await
        .map_err(ApiError::Upstream)?;
    Ok(Json(json!({ "phone": phone, "message_id": res.message_id })))
}

// GET /api/admin/whatsapp/status
pub async fn get_gateway_status(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let statuses = whatsapp_webhooks::gateway_statuses(&state)
        .await
        .map_err(ApiError::Internal)?;
    Ok(Json(json!({ "instances": statuses })))
}
