use axum::{Router, routing::get};
use crate::{AppState, controllers::funds_controller};

pub fn add_routes(router: Router<AppState>) -> Router<AppState> {
    router
        .route("/api/funds", get(funds_controller::get_funds))
        .route("/api/funds/:ticker", get(funds_controller::get_fund))
}
