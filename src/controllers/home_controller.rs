use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use mongodb::bson::doc;
use serde_json::json;

use crate::{error::ApiError, AppState};

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

pub async fn health_db(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.run_command(doc! { "ping": 1 }, None).await {
        Ok(_) => (StatusCode::OK, Json(json!({ "mongo": "ok" }))).into_response(),
        Err(e) => ApiError::Internal(format!("mongo error: {e}")).into_response(),
    }
}

pub async fn not_found() -> impl IntoResponse {
    ApiError::NotFound("route".to_string())
}
