use axum::{Router, routing::{get, post}};
use crate::{AppState, controllers::admin_controller};

pub fn add_routes(router: Router<AppState>) -> Router<AppState> {
    router
        .route("/api/admin/users", get(admin_controller::get_users))
        .route("/api/admin/reports/clear", post(admin_controller::post_clear_reports))
        .route("/api/admin/alerts/clear", post(admin_controller::post_clear_alerts))
        .route("/api/admin/thresholds", post(admin_controller::post_thresholds))
        .route("/api/admin/funds", post(admin_controller::post_fund))
        .route("/api/admin/whatsapp/test", post(admin_controller::post_test_message))
        .route("/api/admin/whatsapp/status", get(admin_controller::get_gateway_status))
}
