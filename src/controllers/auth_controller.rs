use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use serde_json::json;

use crate::{
    error::{ApiError, FieldErrors},
    models::CurrentUser,
    services::auth_service,
    AppState,
};

#[derive(Deserialize)]
pub struct RegisterForm {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

fn session_response(state: &AppState, jar: CookieJar, user: CurrentUser, status: StatusCode) -> Response {
    let token = match auth_service::make_jwt_with_days(state, &user.id, auth_service::SESSION_DAYS) {
        Ok(t) => t,
        Err(e) => return ApiError::Internal(format!("auth error: {e}")).into_response(),
    };

    let jar = jar.add(auth_service::auth_cookie(state, token));
    let body = json!({
        "user": {
            "id": user.id.to_hex(),
            "email": user.email,
            "name": user.name,
            "active_plan": user.active_plan,
        }
    });
    (jar, (status, Json(body))).into_response()
}

// POST /api/auth/register
pub async fn post_register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(form): Json<RegisterForm>,
) -> Response {
    let user = match auth_service::register_user(&state, &form.name, &form.email, &form.password).await {
        Ok(u) => u,
        Err(errs) => return ApiError::Validation(errs).into_response(),
    };

    session_response(&state, jar, CurrentUser::from(user), StatusCode::CREATED)
}

// POST /api/auth/login
pub async fn post_login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(form): Json<LoginForm>,
) -> Response {
    let email = form.email.trim();

    let mut errors = FieldErrors::new();
    if email.is_empty() {
        errors.insert("email".into(), "Email is required.".into());
    }
    if form.password.is_empty() {
        errors.insert("password".into(), "Password is required.".into());
    }
    if !errors.is_empty() {
        return ApiError::Validation(errors).into_response();
    }

    let user = match auth_service::login_user(&state, email, &form.password).await {
        Ok(u) => u,
        Err(errs) => return ApiError::Validation(errs).into_response(),
    };

    session_response(&state, jar, CurrentUser::from(user), StatusCode::OK)
}

// POST /api/auth/logout
pub async fn post_logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let jar = jar.add(auth_service::clear_auth_cookie(&state));
    (jar, Json(json!({ "ok": true })))
}
