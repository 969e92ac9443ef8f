use axum::{
    body::Bytes,
    extract::{Extension, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    controllers::require_user,
    error::{ApiError, ApiResult},
    models::{CurrentUser, Plan},
    services::billing_service,
    AppState,
};

#[derive(Deserialize)]
pub struct CheckoutForm {
    pub plan: String,
}

// POST /api/billing/checkout
pub async fn post_checkout(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Json(form): Json<CheckoutForm>,
) -> ApiResult<Json<Value>> {
    let u = require_user(user)?;
    let Some(plan) = Plan::parse(&form.plan) else {
        return Err(ApiError::field("plan", "Choose basic or premium."));
    };

    let url = billing_service::checkout_url(&state, u.id, plan)
        .await
        .map_err(ApiError::Upstream)?;
    Ok(Json(json!({ "url": url })))
}

// POST /api/billing/portal
pub async fn post_portal(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
) -> ApiResult<Json<Value>> {
    let u = require_user(user)?;
    let url = billing_service::portal_url(&state, u.id)
        .await
        .map_err(ApiError::Upstream)?
        .ok_or_else(|| ApiError::BadRequest("No billing account yet.".to_string()))?;
    Ok(Json(json!({ "url": url })))
}

// POST /api/billing/unsubscribe
pub async fn post_unsubscribe(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
) -> ApiResult<Json<Value>> {
    let u = require_user(user)?;
    if u.active_plan.is_none() {
        return Err(ApiError::BadRequest("No active plan.".to_string()));
    }

    billing_service::unsubscribe(&state, u.id)
        .await
        .map_err(ApiError::Upstream)?;

    tracing::info!(user_id = %u.id, "user unsubscribed");
    Ok(Json(json!({ "active_plan": null })))
}

// POST /api/stripe/webhook
pub async fn post_stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("Missing Stripe-Signature header".to_string()))?;

    let event = state.stripe.construct_event(&body, signature).map_err(|e| {
        tracing::warn!(error = %e, "stripe webhook rejected");
        ApiError::BadRequest(format!("Webhook error: {e}"))
    })?;

    tracing::info!(event_id = %event.id, event_type = %event.event_type, "stripe event received");

    let processed = billing_service::handle_event(&state, &event)
        .await
        .map_err(ApiError::Internal)?;

    Ok(Json(json!({ "received": true, "duplicate": !processed })))
}
