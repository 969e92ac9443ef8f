use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    controllers::require_user,
    error::{ApiError, ApiResult},
    models::{CurrentUser, Follow},
    services::follow_service::{self, FollowSettings},
    AppState,
};

pub fn follow_json(f: &Follow) -> Value {
    json!({
        "ticker": f.ticker,
        "notify": f.notify,
        "notify_price_variation": f.notify_price_variation,
        "notify_reports": f.notify_reports,
        "notify_dividends": f.notify_dividends,
        "variation_threshold": f.variation_threshold,
        "created_at": f.created_at,
    })
}

// GET /api/follows
pub async fn get_follows(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
) -> ApiResult<Json<Value>> {
    let u = require_user(user)?;
    let follows = follow_service::list_follows(&state, u.id)
        .await
        .map_err(ApiError::Internal)?;

    let items: Vec<Value> = follows.iter().map(follow_json).collect();
    Ok(Json(json!({
        "follows": items,
        "limit": follow_service::follow_limit(u.active_plan),
    })))
}

#[derive(Deserialize)]
pub struct FollowForm {
    pub ticker: String,
}

// POST /api/follows
pub async fn post_follow(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Json(form): Json<FollowForm>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let u = require_user(user)?;
    let follow = follow_service::follow(&state, u.id, u.active_plan, &form.ticker).await?;
    Ok((StatusCode::CREATED, Json(follow_json(&follow))))
}

// PATCH /api/follows/:ticker
pub async fn patch_follow(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    user: Option<Extension<CurrentUser>>,
    Json(settings): Json<FollowSettings>,
) -> ApiResult<Json<Value>> {
    let u = require_user(user)?;
    let follow = follow_service::update_follow(&state, u.id, &ticker, &settings)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Follow {}", ticker.to_uppercase())))?;
    Ok(Json(follow_json(&follow)))
}

// DELETE /api/follows/:ticker
pub async fn delete_follow(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    user: Option<Extension<CurrentUser>>,
) -> ApiResult<Json<Value>> {
    let u = require_user(user)?;
    let removed = follow_service::unfollow(&state, u.id, &ticker)
        .await
        .map_err(ApiError::Internal)?;
    if !removed {
        return Err(ApiError::NotFound(format!("Follow {}", ticker.to_uppercase())));
    }
    Ok(Json(json!({ "ok": true })))
}
