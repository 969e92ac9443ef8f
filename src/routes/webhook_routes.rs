use axum::{Router, middleware::from_fn_with_state, routing::post};
use crate::{
    AppState, auth,
    controllers::{documents_controller, whatsapp_controller},
};

/// Machine-to-machine routes, each group behind its shared secret.
pub fn add_routes(router: Router<AppState>, state: &AppState) -> Router<AppState> {
    let hooks = Router::new()
        .route("/api/whatsapp/webhook/:kind", post(whatsapp_controller::post_webhook))
        .route("/api/documents/reports", post(documents_controller::post_report))
        .route("/api/documents/dividends", post(documents_controller::post_dividend))
        .route_layer(from_fn_with_state(state.clone(), auth::require_webhook_secret));

    let cron = Router::new()
        .route("/api/cron/price-check", post(documents_controller::post_price_check))
        .route_layer(from_fn_with_state(state.clone(), auth::require_cron_secret));

    router.merge(hooks).merge(cron)
}
