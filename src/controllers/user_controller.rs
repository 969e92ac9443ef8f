use axum::{
    extract::{Extension, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    controllers::require_user,
    error::{ApiError, ApiResult},
    models::{CurrentUser, User},
    services::{alert_service, follow_service, user_service},
    AppState,
};

/// Public view of a user. Never includes hashes or pending codes.
pub fn user_json(u: &User) -> Value {
    json!({
        "id": u.id.to_hex(),
        "email": u.email,
        "name": u.name,
        "active_plan": u.active_plan,
        "has_subscription": u.stripe_subscription_id.is_some(),
        "whatsapp": {
            "phone": u.whatsapp_phone,
            "verified": u.whatsapp_verified,
            "pending": u.whatsapp_code.is_some(),
        },
        "alerts": u.alerts,
        "follow_limit": follow_service::follow_limit(u.active_plan),
        "created_at": u.created_at,
    })
}

async fn load_user(state: &AppState, u: &CurrentUser) -> ApiResult<User> {
    user_service::find_user(state, u.id)
        .await
        .map_err(ApiError::Internal)?
        .ok_or(ApiError::Unauthorized)
}

// GET /api/me
pub async fn me(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
) -> ApiResult<Json<Value>> {
    let u = require_user(user)?;
    let full = load_user(&state, &u).await?;
    Ok(Json(user_json(&full)))
}

// PATCH /api/me/preferences
pub async fn patch_preferences(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Json(patch): Json<user_service::PreferencesPatch>,
) -> ApiResult<Json<Value>> {
    let u = require_user(user)?;
    let alerts = user_service::update_preferences(&state, u.id, &patch).await?;
    Ok(Json(json!({ "alerts": alerts })))
}

#[derive(Deserialize)]
pub struct PhoneForm {
    pub phone: String,
}

// POST /api/me/whatsapp
pub async fn post_whatsapp(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Json(form): Json<PhoneForm>,
) -> ApiResult<Json<Value>> {
    let u = require_user(user)?;
    let phone = user_service::start_whatsapp_verification(&state, u.id, &form.phone).await?;
    Ok(Json(json!({
        "phone": phone,
        "expires_in_minutes": user_service::CODE_TTL_MINUTES,
    })))
}

#[derive(Deserialize)]
pub struct CodeForm {
    pub code: String,
}

// POST /api/me/whatsapp/verify
pub async fn post_whatsapp_verify(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Json(form): Json<CodeForm>,
) -> ApiResult<Json<Value>> {
    let u = require_user(user)?;
    if form.code.trim().is_empty() {
        return Err(ApiError::field("code", "Code is required."));
    }

    user_service::confirm_whatsapp_code(&state, u.id, &form.code).await?;
    Ok(Json(json!({ "verified": true })))
}

// DELETE /api/me/whatsapp
pub async fn delete_whatsapp(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
) -> ApiResult<Json<Value>> {
    let u = require_user(user)?;
    user_service::remove_whatsapp(&state, u.id)
        .await
        .map_err(ApiError::Internal)?;
    Ok(Json(json!({ "ok": true })))
}

// GET /api/me/alerts
pub async fn get_sent_alerts(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
) -> ApiResult<Json<Value>> {
    let u = require_user(user)?;
    let items = alert_service::list_sent_alerts(&state, u.id, 100)
        .await
        .map_err(ApiError::Internal)?;

    let alerts: Vec<Value> = items
        .into_iter()
        .map(|a| {
            json!({
                "ticker": a.ticker,
                "kind": a.kind,
                "reference": a.reference,
                "delivery_status": a.delivery_status,
                "sent_at": a.sent_at,
            })
        })
        .collect();

    Ok(Json(json!({ "alerts": alerts })))
}
