use axum::{Router, routing::post};
use crate::{AppState, controllers::billing_controller};

pub fn add_routes(router: Router<AppState>) -> Router<AppState> {
    router
        .route("/api/billing/checkout", post(billing_controller::post_checkout))
        .route("/api/billing/portal", post(billing_controller::post_portal))
        .route("/api/billing/unsubscribe", post(billing_controller::post_unsubscribe))
        // authenticated by the Stripe signature
        .route("/api/stripe/webhook", post(billing_controller::post_stripe_webhook))
}
