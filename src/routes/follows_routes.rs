use axum::{Router, routing::{get, patch}};
use crate::{AppState, controllers::follows_controller};

pub fn add_routes(router: Router<AppState>) -> Router<AppState> {
    router
        .route(
            "/api/follows",
            get(follows_controller::get_follows).post(follows_controller::post_follow),
        )
        .route(
            "/api/follows/:ticker",
            patch(follows_controller::patch_follow).delete(follows_controller::delete_follow),
        )
}
