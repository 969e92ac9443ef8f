use std::net::SocketAddr;

use mongodb::Client;
use tracing_subscriber::EnvFilter;

use fiialerts::{config, routes, services::db_init, AppState};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = config::load();

    // Mongo connection
    let client = Client::with_uri_str(&settings.mongodb_uri)
        .await
        .expect("Failed to connect to MongoDB");
    let db = client.database(&settings.mongodb_db);

    // the unique indexes back alert and document dedup, so do not serve without them
    db_init::ensure_indexes(&db)
        .await
        .expect("Failed to create MongoDB indexes");

    if settings.webhook_secret.is_empty() {
        tracing::warn!("WEBHOOK_SECRET is empty, webhook and document routes will reject every call");
    }
    if settings.stripe_webhook_secret.is_empty() {
        tracing::warn!("STRIPE_WEBHOOK_SECRET is empty, Stripe events will be rejected");
    }

    let host: std::net::IpAddr = settings
        .host
        .parse()
        .expect("HOST must be an IP address");
    let addr = SocketAddr::from((host, settings.port));

    let app = routes::app(AppState::new(db, settings));

    tracing::info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.expect("bind failed");
    axum::serve(listener, app).await.expect("server error");
}
