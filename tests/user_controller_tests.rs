use axum::{
    http::{header, Request, StatusCode},
    middleware::from_fn_with_state,
    routing::{get, post},
    Extension, Router,
};
use http_body_util::BodyExt;
use mongodb::{bson::oid::ObjectId, Client};
use fiialerts::{
    auth,
    config,
    controllers::{admin_controller, follows_controller, user_controller},
    models::{CurrentUser, Plan},
    routes, AppState,
};
use serde_json::Value;
use tower::ServiceExt;

async fn test_state() -> AppState {
    let mut settings = config::load();
    settings.admin_emails = vec!["admin@example.com".to_string()];

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

fn current_user(email: &str) -> CurrentUser {
    CurrentUser {
        id: ObjectId::new(),
        email: email.to_string(),
        name: "Test".to_string(),
        active_plan: Some(Plan::Basic),
    }
}

fn json_post(uri: &str, body: &str) -> Request<axum::body::Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn anonymous_user_routes_are_unauthorized() {
    for uri in ["/api/me", "/api/follows", "/api/me/alerts", "/api/admin/users"] {
        let app = routes::app(test_state().await);
        let req = Request::builder()
            .uri(uri)
            .body(axum::body::Body::empty())
            .unwrap();

        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{uri}");
    }
}

#[tokio::test]
async fn garbage_session_cookie_is_unauthorized() {
    let state = test_state().await;
    let cookie = format!("{}=not-a-jwt", state.settings.jwt_cookie_name);
    let app = routes::app(state);

    let req = Request::builder()
        .uri("/api/me")
        .header(header::COOKIE, cookie)
        .body(axum::body::Body::empty())
        .unwrap();

    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_routes_forbid_regular_users() {
    let state = test_state().await;
    let app = Router::new()
        .route("/api/admin/users", get(admin_controller::get_users))
        .layer(from_fn_with_state(state.clone(), auth::require_auth))
        .layer(Extension(current_user("someone@example.com")))
        .with_state(state);

    let req = Request::builder()
        .uri("/api/admin/users")
        .body(axum::body::Body::empty())
        .unwrap();

    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_passes_guard_and_threshold_is_validated() {
    let state = test_state().await;
    let app = Router::new()
        .route("/api/admin/thresholds", post(admin_controller::post_thresholds))
        .layer(from_fn_with_state(state.clone(), auth::require_auth))
        .layer(Extension(current_user("Admin@Example.com")))
        .with_state(state);

    let res = app
        .oneshot(json_post("/api/admin/thresholds", r#"{"threshold":150.0}"#))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = response_json(res).await;
    assert_eq!(body["fields"]["threshold"], "Threshold must be between 0 and 100 percent.");
}

#[tokio::test]
async fn post_follow_without_user_is_unauthorized() {
    let state = test_state().await;
    let app = Router::new()
        .route("/follows", post(follows_controller::post_follow))
        .with_state(state);

    let res = app
        .oneshot(json_post("/follows", r#"{"ticker":"HGLG11"}"#))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn post_follow_rejects_invalid_ticker() {
    let state = test_state().await;
    let app = Router::new()
        .route("/follows", post(follows_controller::post_follow))
        .layer(Extension(current_user("someone@example.com")))
        .with_state(state);

    let res = app
        .oneshot(json_post("/follows", r#"{"ticker":"PETR4"}"#))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = response_json(res).await;
    assert!(body["fields"]["ticker"].as_str().unwrap().contains("valid FII ticker"));
}

#[tokio::test]
async fn whatsapp_verify_requires_code() {
    let state = test_state().await;
    let app = Router::new()
        .route("/verify", post(user_controller::post_whatsapp_verify))
        .layer(Extension(current_user("someone@example.com")))
        .with_state(state);

    let res = app
        .oneshot(json_post("/verify", r#"{"code":"   "}"#))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = response_json(res).await;
    assert_eq!(body["fields"]["code"], "Code is required.");
}

#[tokio::test]
async fn fund_lookup_rejects_invalid_ticker() {
    let app = routes::app(test_state().await);
    let req = Request::builder()
        .uri("/api/funds/PETR4")
        .body(axum::body::Body::empty())
        .unwrap();

    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_route_is_json_not_found() {
    let app = routes::app(test_state().await);
    let req = Request::builder()
        .uri("/nope")
        .body(axum::body::Body::empty())
        .unwrap();

    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let body = response_json(res).await;
    assert_eq!(body["error"], "route not found");
}
