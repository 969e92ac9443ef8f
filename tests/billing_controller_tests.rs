use axum::{
    http::{header, Request, StatusCode},
    routing::post,
    Extension, Router,
};
use http_body_util::BodyExt;
use mongodb::{bson::oid::ObjectId, Client};
use fiialerts::{
    config,
    controllers::billing_controller,
    models::CurrentUser,
    routes, AppState,
};
use serde_json::Value;
use tower::ServiceExt;

async fn test_state() -> AppState {
    let mut settings = config::load();
    settings.stripe_webhook_secret = "whsec_test".to_string();

    let client = Client::with_uri_str(&settings.mongodb_uri)
        .await
        .expect("mongodb client");
    let db = client.database(&settings.mongodb_db);

    AppState::new(db, settings)
}

async fn response_json(res: axum::response::Response) -> Value {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn free_user() -> CurrentUser {
    CurrentUser {
        id: ObjectId::new(),
        email: "free@example.com".to_string(),
        name: "Free".to_string(),
        active_plan: None,
    }
}

const EVENT: &str = r#"{"id":"evt_1","type":"checkout.session.completed","data":{"object":{}}}"#;

#[tokio::test]
async fn stripe_webhook_requires_signature_header() {
    let app = routes::app(test_state().await);
    let req = Request::builder()
        .method("POST")
        .uri("/api/stripe/webhook")
        .body(axum::body::Body::from(EVENT))
        .unwrap();

    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let body = response_json(res).await;
    assert_eq!(body["error"], "Missing Stripe-Signature header");
}

#[tokio::test]
async fn stripe_webhook_rejects_bad_signature() {
    let app = routes::app(test_state().await);
    let now = chrono::Utc::now().timestamp();
    let req = Request::builder()
        .method("POST")
        .uri("/api/stripe/webhook")
        .header("stripe-signature", format!("t={now},v1={}", "ab".repeat(32)))
        .body(axum::body::Body::from(EVENT))
        .unwrap();

    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn checkout_rejects_unknown_plan() {
    let state = test_state().await;
    let app = Router::new()
        .route("/checkout", post(billing_controller::post_checkout))
        .layer(Extension(free_user()))
        .with_state(state);

    let req = Request::builder()
        .method("POST")
        .uri("/checkout")
        .header(header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from(r#"{"plan":"gold"}"#))
        .unwrap();

    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = response_json(res).await;
    assert_eq!(body["fields"]["plan"], "Choose basic or premium.");
}

#[tokio::test]
async fn unsubscribe_without_plan_is_bad_request() {
    let state = test_state().await;
    let app = Router::new()
        .route("/unsubscribe", post(billing_controller::post_unsubscribe))
        .layer(Extension(free_user()))
        .with_state(state);

    let req = Request::builder()
        .method("POST")
        .uri("/unsubscribe")
        .body(axum::body::Body::empty())
        .unwrap();

    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn billing_routes_require_login() {
    let app = routes::app(test_state().await);
    let req = Request::builder()
        .method("POST")
        .uri("/api/billing/checkout")
        .header(header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from(r#"{"plan":"basic"}"#))
        .unwrap();

    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}
