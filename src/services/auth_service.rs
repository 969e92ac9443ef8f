use axum_extra::extract::cookie::{Cookie, SameSite};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use mongodb::bson::{doc, oid::ObjectId};
use regex::Regex;
use std::sync::OnceLock;

use crate::{
    error::{is_duplicate_key, FieldErrors},
    models::{AlertPreferences, User},
    AppState,
};

pub const SESSION_DAYS: i64 = 30;

#[derive(serde::Serialize)]
struct Claims {
    sub: String,
    exp: usize,
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex"))
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Field-level validation for the sign-up form.
pub fn validate_registration(name: &str, email: &str, password: &str) -> FieldErrors {
    let mut errs = FieldErrors::new();

    if name.trim().is_empty() {
        errs.insert("name".into(), "Name is required.".into());
    }
    if !email_re().is_match(email.trim()) {
        errs.insert("email".into(), "Please enter a valid email.".into());
    }
    if password.chars().count() < 8 {
        errs.insert("password".into(), "Password must have at least 8 characters.".into());
    }

    errs
}

pub fn make_jwt_with_days(state: &AppState, user_id: &ObjectId, days: i64) -> Result<String, String> {
    let exp = (Utc::now() + Duration::days(days)).timestamp() as usize;

    let claims = Claims {
        sub: user_id.to_hex(),
        exp,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.settings.jwt_secret.as_bytes()),
    )
    .map_err(|e| e.to_string())
}

pub fn auth_cookie(state: &AppState, token: String) -> Cookie<'static> {
    let mut cookie = Cookie::new(state.settings.jwt_cookie_name.clone(), token);
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_path("/");
    if state.settings.cookie_secure {
        cookie.set_secure(true);
    }
    cookie
}

pub fn clear_auth_cookie(state: &AppState) -> Cookie<'static> {
    let mut cookie = Cookie::new(state.settings.jwt_cookie_name.clone(), "");
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.make_removal();
    cookie
}

pub async fn login_user(state: &AppState, email: &str, password: &str) -> Result<User, FieldErrors> {
    let mut errs = FieldErrors::new();

    let users = state.db.collection::<User>("users");
    let email = normalize_email(email);

    let user = match users.find_one(doc! { "email": &email }, None).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            errs.insert("_form".into(), "Invalid email or password.".into());
            return Err(errs);
        }
        Err(e) => {
            tracing::error!(error = %e, "login lookup failed");
            errs.insert("_form".into(), "Server error. Please try again.".into());
            return Err(errs);
        }
    };

    if !verify(password, &user.password_hash).unwrap_or(false) {
        errs.insert("_form".into(), "Invalid email or password.".into());
        return Err(errs);
    }

    Ok(user)
}

pub async fn register_user(
    state: &AppState,
    name: &str,
    email: &str,
    password: &str,
) -> Result<User, FieldErrors> {
    let mut errs = validate_registration(name, email, password);
    if !errs.is_empty() {
        return Err(errs);
    }

    let pw_hash = match hash(password, DEFAULT_COST) {
        Ok(h) => h,
        Err(_) => {
            errs.insert("_form".into(), "There is a problem registering this user!".into());
            return Err(errs);
        }
    };

    let user = User {
        id: ObjectId::new(),
        email: normalize_email(email),
        name: name.trim().to_string(),
        password_hash: pw_hash,
        active_plan: None,
        stripe_customer_id: None,
        stripe_subscription_id: None,
        whatsapp_phone: None,
        whatsapp_verified: false,
        whatsapp_code: None,
        whatsapp_code_expires_at: None,
        alerts: AlertPreferences::default(),
        created_at: Utc::now().timestamp(),
    };

    // unique index on email decides races
    if let Err(e) = state.db.collection::<User>("users").insert_one(&user, None).await {
        if is_duplicate_key(&e.to_string()) {
            errs.insert("email".into(), "Email has already been taken!".into());
        } else {
            tracing::error!(error = %e, "user insert failed");
            errs.insert("_form".into(), "There is a problem registering this user!".into());
        }
        return Err(errs);
    }

    tracing::info!(user_id = %user.id, "user registered");
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_validation() {
        assert!(validate_registration("Ana", "ana@example.com", "longenough").is_empty());

        let errs = validate_registration("", "not-an-email", "short");
        assert!(errs.contains_key("name"));
        assert!(errs.contains_key("email"));
        assert!(errs.contains_key("password"));
    }

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  Ana@Example.COM "), "ana@example.com");
    }
}
