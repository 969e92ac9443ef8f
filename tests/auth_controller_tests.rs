use axum::{
    http::{header, Request, StatusCode},
    routing::post,
    Router,
};
use http_body_util::BodyExt;
use mongodb::Client;
use fiialerts::{controllers::auth_controller, config, AppState};
use serde_json::Value;
use tower::ServiceExt;

async fn test_state() -> AppState {
    let settings = config::load();

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

fn json_post(uri: &str, body: &str) -> Request<axum::body::Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn post_login_missing_fields_returns_field_errors() {
    let state = test_state().await;
    let app = Router::new()
        .route("/login", post(auth_controller::post_login))
        .with_state(state);

    let res = app
        .oneshot(json_post("/login", r#"{"email":"","password":""}"#))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = response_json(res).await;
    assert_eq!(body["fields"]["email"], "Email is required.");
    assert_eq!(body["fields"]["password"], "Password is required.");
}

#[tokio::test]
async fn post_register_invalid_input_returns_field_errors() {
    let state = test_state().await;
    let app = Router::new()
        .route("/register", post(auth_controller::post_register))
        .with_state(state);

    let res = app
        .oneshot(json_post(
            "/register",
            r#"{"name":"  ","email":"not-an-email","password":"short"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = response_json(res).await;
    assert_eq!(body["fields"]["name"], "Name is required.");
    assert_eq!(body["fields"]["email"], "Please enter a valid email.");
    assert_eq!(body["fields"]["password"], "Password must have at least 8 characters.");
}

#[tokio::test]
async fn post_logout_clears_cookie() {
    let state = test_state().await;
    let cookie_name = state.settings.jwt_cookie_name.clone();
    let app = Router::new()
        .route("/logout", post(auth_controller::post_logout))
        .with_state(state);

    let req = Request::builder()
        .method("POST")
        .uri("/logout")
        .body(axum::body::Body::empty())
        .unwrap();

    let res = app.oneshot(req).await.unwrap();
    assert!(res.status().is_success());

    let set_cookie = res
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(set_cookie.starts_with(&format!("{cookie_name}=")));
}
