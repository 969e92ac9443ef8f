use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use mongodb::Client;
use fiialerts::{config, routes, AppState};
use serde_json::Value;
use tower::ServiceExt;

const SECRET: &str = "hook-secret";
const CRON: &str = "cron-secret";

async fn test_state() -> AppState {
    let mut settings = config::load();
    settings.webhook_secret = SECRET.to_string();
    settings.cron_secret = CRON.to_string();

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

fn json_post(uri: &str, secret: Option<&str>, body: &str) -> Request<axum::body::Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(s) = secret {
        builder = builder.header("x-webhook-secret", s);
    }
    builder.body(axum::body::Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn whatsapp_webhook_rejects_missing_secret() {
    let app = routes::app(test_state().await);
    let res = app
        .oneshot(json_post("/api/whatsapp/webhook/received", None, "{}"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn whatsapp_webhook_rejects_wrong_secret() {
    let app = routes::app(test_state().await);
    let res = app
        .oneshot(json_post("/api/whatsapp/webhook/received", Some("nope"), "{}"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn whatsapp_webhook_unknown_kind_is_not_found() {
    let app = routes::app(test_state().await);
    let res = app
        .oneshot(json_post("/api/whatsapp/webhook/typing", Some(SECRET), "{}"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn document_ingestion_rejects_wrong_secret() {
    for uri in ["/api/documents/reports", "/api/documents/dividends"] {
        let app = routes::app(test_state().await);
        let res = app
            .oneshot(json_post(uri, Some("wrong"), "{}"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{uri}");
    }
}

#[tokio::test]
async fn document_ingestion_accepts_secret_in_query_and_validates() {
    let app = routes::app(test_state().await);
    let body = r#"{
        "ticker": "XXXX",
        "kind": "",
        "title": "Relatório Gerencial",
        "url": "ftp://example.com/doc.pdf",
        "reference_date": "2024-13-01"
    }"#;

    let uri = format!("/api/documents/reports?secret={SECRET}");
    let res = app.oneshot(json_post(&uri, None, body)).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = response_json(res).await;
    assert_eq!(body["fields"]["ticker"], "Invalid FII ticker.");
    assert_eq!(body["fields"]["kind"], "Document kind is required.");
    assert_eq!(body["fields"]["url"], "A http(s) link is required.");
    assert_eq!(body["fields"]["reference_date"], "Use the YYYY-MM-DD format.");
}

#[tokio::test]
async fn cron_requires_bearer_secret() {
    let app = routes::app(test_state().await);
    let res = app
        .oneshot(json_post("/api/cron/price-check", None, "{}"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let app = routes::app(test_state().await);
    let req = Request::builder()
        .method("POST")
        .uri("/api/cron/price-check")
        .header(header::AUTHORIZATION, "Bearer wrong")
        .body(axum::body::Body::empty())
        .unwrap();
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn webhook_secret_does_not_open_cron() {
    let app = routes::app(test_state().await);
    let req = Request::builder()
        .method("POST")
        .uri("/api/cron/price-check")
        .header(header::AUTHORIZATION, format!("Bearer {SECRET}"))
        .body(axum::body::Body::empty())
        .unwrap();
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn encoded_query_secret_is_accepted() {
    let mut state = test_state().await;
    state.settings.webhook_secret = "a+b/c=&d".to_string();
    let app = routes::app(state);

    let body = r#"{"ticker":"XXXX","kind":"","title":"","url":"","reference_date":""}"#;
    let res = app
        .oneshot(json_post("/api/documents/reports?secret=a%2Bb%2Fc%3D%26d", None, body))
        .await
        .unwrap();

    // past the secret gate, stopped by validation
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
