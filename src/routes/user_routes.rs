use axum::{Router, routing::{get, patch, post}};
use crate::{AppState, controllers::user_controller};

pub fn add_routes(router: Router<AppState>) -> Router<AppState> {
    router
        .route("/api/me", get(user_controller::me))
        .route("/api/me/preferences", patch(user_controller::patch_preferences))
        .route(
            "/api/me/whatsapp",
            post(user_controller::post_whatsapp).delete(user_controller::delete_whatsapp),
        )
        .route("/api/me/whatsapp/verify", post(user_controller::post_whatsapp_verify))
        .route("/api/me/alerts", get(user_controller::get_sent_alerts))
}
