use axum::extract::Extension;

use crate::{error::{ApiError, ApiResult}, models::CurrentUser};

pub mod admin_controller;
pub mod auth_controller;
pub mod billing_controller;
pub mod documents_controller;
pub mod follows_controller;
pub mod funds_controller;
pub mod home_controller;
pub mod user_controller;
pub mod whatsapp_controller;

/// Logged-in user or 401.
pub(crate) fn require_user(user: Option<Extension<CurrentUser>>) -> ApiResult<CurrentUser> {
    user.map(|Extension(u)| u).ok_or(ApiError::Unauthorized)
}
