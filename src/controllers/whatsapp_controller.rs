use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};

use crate::{
    error::{ApiError, ApiResult},
    services::whatsapp_webhooks::{self, WebhookKind},
    AppState,
};

// POST /api/whatsapp/webhook/:kind
//
// Always 200 once authenticated and parsed, so the gateway does not redeliver.
pub async fn post_webhook(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Json(payload): Json<Value>,
) -> ApiResult<Json<Value>> {
    let Some(kind) = WebhookKind::parse(&kind) else {
        return Err(ApiError::NotFound(format!("Webhook {kind}")));
    };

    let outcome = match whatsapp_webhooks::handle(&state, kind, payload).await {
        Ok(o) => o,
        Err(e) => {
            tracing::error!(kind = kind.as_str(), error = %e, "whatsapp webhook failed");
            "error"
        }
    };

    Ok(Json(json!({ "ok": true, "outcome": outcome })))
}
