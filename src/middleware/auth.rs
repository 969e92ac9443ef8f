use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, Request, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};

use hmac::{Hmac, Mac};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use mongodb::bson::{doc, oid::ObjectId};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::{error::ApiError, models::{CurrentUser, User}, AppState};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    // user id as hex string
    pub sub: String,
    // expiry (unix timestamp seconds)
    pub exp: usize,
}

fn get_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;

    for part in raw.split(';') {
        let part = part.trim();
        let mut it = part.splitn(2, '=');
        let k = it.next()?.trim();
        let v = it.next()?.trim();
        if k == name {
            return Some(v.to_string());
        }
    }
    None
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

pub fn decode_user_id(token: &str, secret: &str) -> Option<ObjectId> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation).ok()?;
    ObjectId::parse_str(&data.claims.sub).ok()
}

/// Puts the logged-in [`CurrentUser`] into request extensions when the session cookie is valid.
pub async fn inject_current_user(
    State(state): State<AppState>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let cookie_name = state.settings.jwt_cookie_name.as_str();

    if let Some(token) = get_cookie(req.headers(), cookie_name) {
        if let Some(user_id) = decode_user_id(&token, &state.settings.jwt_secret) {
            let users = state.db.collection::<User>("users");

            match users.find_one(doc! { "_id": user_id }, None).await {
                Ok(Some(user)) => {
                    req.extensions_mut().insert(CurrentUser::from(user));
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "session user lookup failed"),
            }
        }
    }

    next.run(req).await
}

fn is_user_path(path: &str) -> bool {
    path.starts_with("/api/me")
        || path.starts_with("/api/follows")
        || path.starts_with("/api/billing")
        || path.starts_with("/api/admin")
}

/// 401 for anonymous calls to user routes, 403 for non-admins on admin routes.
pub async fn require_auth(
    State(state): State<AppState>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let path = req.uri().path();
    if !is_user_path(path) {
        return next.run(req).await;
    }

    let Some(user) = req.extensions().get::<CurrentUser>() else {
        return ApiError::Unauthorized.into_response();
    };

    if path.starts_with("/api/admin") && !state.settings.is_admin(&user.email) {
        tracing::warn!(user_id = %user.id, path, "admin route denied");
        return ApiError::Forbidden.into_response();
    }

    next.run(req).await
}

type HmacSha256 = Hmac<Sha256>;

// key for the fixed-length tags compared in `secrets_match`
const COMPARE_KEY: &[u8] = b"fiialerts/shared-secret";

fn secret_tag(value: &str) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(COMPARE_KEY).ok()?;
    mac.update(value.as_bytes());
    Some(mac)
}

/// Constant-time comparison of HMAC tags, so neither content nor length leaks.
/// An unset expected secret never matches.
pub fn secrets_match(expected: &str, given: &str) -> bool {
    if expected.is_empty() {
        return false;
    }
    let (Some(expected), Some(given)) = (secret_tag(expected), secret_tag(given)) else {
        return false;
    };
    given.verify_slice(&expected.finalize().into_bytes()).is_ok()
}

#[derive(Deserialize)]
struct SecretQuery {
    secret: Option<String>,
}

/// Percent-decoded `?secret=`.
fn query_secret(uri: &Uri) -> Option<String> {
    Query::<SecretQuery>::try_from_uri(uri).ok()?.0.secret
}

/// Gateway and document-ingestion callers: `x-webhook-secret` header or `?secret=`.
pub async fn require_webhook_secret(
    State(state): State<AppState>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let given = req
        .headers()
        .get("x-webhook-secret")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| query_secret(req.uri()))
        .unwrap_or_default();

    if !secrets_match(&state.settings.webhook_secret, &given) {
        tracing::warn!(path = req.uri().path(), "webhook secret rejected");
        return ApiError::Unauthorized.into_response();
    }

    next.run(req).await
}

/// External cron trigger: `Authorization: Bearer <CRON_SECRET>`.
pub async fn require_cron_secret(
    State(state): State<AppState>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let given = bearer_token(req.headers()).unwrap_or("");

    if !secrets_match(&state.settings.cron_secret, given) {
        tracing::warn!(path = req.uri().path(), "cron secret rejected");
        return ApiError::Unauthorized.into_response();
    }

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn secret_comparison() {
        assert!(secrets_match("s3cret", "s3cret"));
        assert!(!secrets_match("s3cret", "s3creT"));
        assert!(!secrets_match("s3cret", "s3cret!"));
        assert!(!secrets_match("", ""));
        assert!(!secrets_match("s3cret", ""));
    }

    #[test]
    fn query_secret_is_percent_decoded() {
        let uri: Uri = "/hook?secret=a%2Bb%2Fc%3D%26d".parse().unwrap();
        let given = query_secret(&uri).unwrap();
        assert_eq!(given, "a+b/c=&d");
        assert!(secrets_match("a+b/c=&d", &given));
    }

    #[test]
    fn reads_cookie_and_query() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; auth=abc.def.ghi"));
        assert_eq!(get_cookie(&headers, "auth").as_deref(), Some("abc.def.ghi"));
        assert_eq!(get_cookie(&headers, "missing"), None);

        let uri: Uri = "/hook?a=1&secret=xyz".parse().unwrap();
        assert_eq!(query_secret(&uri).as_deref(), Some("xyz"));
        let uri: Uri = "/hook?a=1".parse().unwrap();
        assert_eq!(query_secret(&uri), None);
        let uri: Uri = "/hook".parse().unwrap();
        assert_eq!(query_secret(&uri), None);
    }

    #[test]
    fn rejects_foreign_tokens() {
        assert_eq!(decode_user_id("not-a-jwt", "secret"), None);
    }
}
