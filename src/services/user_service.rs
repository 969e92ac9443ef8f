use chrono::Utc;
use futures_util::StreamExt;
use mongodb::bson::{doc, oid::ObjectId, Document};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument};
use rand::Rng;
use serde::Deserialize;
use serde_json::json;

use crate::{
    error::FieldErrors,
    models::{AlertPreferences, Plan, User},
    services::whatsapp::normalize_phone,
    templates, AppState,
};

pub const CODE_TTL_MINUTES: i64 = 10;

fn users(state: &AppState) -> mongodb::Collection<User> {
    state.db.collection::<User>("users")
}

pub async fn find_user(state: &AppState, user_id: ObjectId) -> Result<Option<User>, String> {
    users(state)
        .find_one(doc! { "_id": user_id }, None)
        .await
        .map_err(|e| e.to_string())
}

pub async fn find_many(state: &AppState, ids: &[ObjectId]) -> Result<Vec<User>, String> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut cursor = users(state)
        .find(doc! { "_id": { "$in": ids.to_vec() } }, None)
        .await
        .map_err(|e| e.to_string())?;

    let mut items = Vec::new();
    while let Some(res) = cursor.next().await {
        items.push(res.map_err(|e| e.to_string())?);
    }
    Ok(items)
}

pub async fn list_users(state: &AppState) -> Result<Vec<User>, String> {
    let opts = FindOptions::builder().sort(doc! { "created_at": -1 }).build();
    let mut cursor = users(state)
        .find(doc! {}, opts)
        .await
        .map_err(|e| e.to_string())?;

    let mut items = Vec::new();
    while let Some(res) = cursor.next().await {
        items.push(res.map_err(|e| e.to_string())?);
    }
    Ok(items)
}

// ---------------- Preferences ----------------

#[derive(Debug, Default, Deserialize)]
pub struct PreferencesPatch {
    pub enabled: Option<bool>,
    pub price_variation: Option<bool>,
    pub reports: Option<bool>,
    pub dividends: Option<bool>,
}

impl PreferencesPatch {
    fn to_set(&self) -> Document {
        let mut set = Document::new();
        if let Some(v) = self.enabled {
            set.insert("alerts.enabled", v);
        }
        if let Some(v) = self.price_variation {
            set.insert("alerts.price_variation", v);
        }
        if let Some(v) = self.reports {
            set.insert("alerts.reports", v);
        }
        if let Some(v) = self.dividends {
            set.insert("alerts.dividends", v);
        }
        set
    }
}

pub async fn update_preferences(
    state: &AppState,
    user_id: ObjectId,
    patch: &PreferencesPatch,
) -> Result<AlertPreferences, FieldErrors> {
    let mut errs = FieldErrors::new();

    let set = patch.to_set();
    if set.is_empty() {
        errs.insert("_form".into(), "Nothing to update.".into());
        return Err(errs);
    }

    let opts = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();

    match users(state)
        .find_one_and_update(doc! { "_id": user_id }, doc! { "$set": set }, opts)
        .await
    {
        Ok(Some(u)) => Ok(u.alerts),
        Ok(None) => {
            errs.insert("_form".into(), "User not found.".into());
            Err(errs)
        }
        Err(e) => {
            errs.insert("_form".into(), format!("db error: {e}"));
            Err(errs)
        }
    }
}

// ---------------- WhatsApp verification ----------------

fn new_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

/// Checks a submitted code against the pending one stored on the user.
pub fn check_code(user: &User, code: &str, now: i64) -> Result<(), &'static str> {
    let (Some(expected), Some(expires_at)) = (&user.whatsapp_code, user.whatsapp_code_expires_at) else {
        return Err("No verification in progress.");
    };
    if now > expires_at {
        return Err("Verification code expired. Request a new one.");
    }
    if expected != code.trim() {
        return Err("Invalid verification code.");
    }
    Ok(())
}

pub async fn start_whatsapp_verification(
    state: &AppState,
    user_id: ObjectId,
    raw_phone: &str,
) -> Result<String, FieldErrors> {
    let mut errs = FieldErrors::new();

    let Some(phone) = normalize_phone(raw_phone) else {
        errs.insert("phone".into(), "Please enter a valid Brazilian phone number with area code.".into());
        return Err(errs);
    };

    // a verified number belongs to a single account
    match users(state)
        .find_one(
            doc! { "whatsapp_phone": &phone, "whatsapp_verified": true, "_id": { "$ne": user_id } },
            None,
        )
        .await
    {
        Ok(Some(_)) => {
            errs.insert("phone".into(), "This number is already linked to another account.".into());
            return Err(errs);
        }
        Ok(None) => {}
        Err(e) => {
            errs.insert("_form".into(), format!("db error: {e}"));
            return Err(errs);
        }
    }

    let code = new_code();
    let expires_at = Utc::now().timestamp() + CODE_TTL_MINUTES * 60;

    if let Err(e) = users(state)
        .update_one(
            doc! { "_id": user_id },
            doc! { "$set": {
                "whatsapp_phone": &phone,
                "whatsapp_verified": false,
                "whatsapp_code": &code,
                "whatsapp_code_expires_at": expires_at,
            } },
            None,
        )
        .await
    {
        errs.insert("_form".into(), format!("db error: {e}"));
        return Err(errs);
    }

    let message = match templates::render(
        &state.hbs,
        "whatsapp/verification",
        &json!({ "code": code, "minutes": CODE_TTL_MINUTES }),
    ) {
        Ok(m) => m,
        Err(e) => {
            errs.insert("_form".into(), format!("template error: {e}"));
            return Err(errs);
        }
    };

    if let Err(e) = state.whatsapp.send_text(&phone, &message).await {
        tracing::warn!(user_id = %user_id, error = %e, "verification code not delivered");
        errs.insert("_form".into(), "Could not send the code over WhatsApp. Please try again.".into());
        return Err(errs);
    }

    tracing::info!(user_id = %user_id, "whatsapp verification started");
    Ok(phone)
}

async fn mark_verified(state: &AppState, user_id: ObjectId) -> Result<(), String> {
    users(state)
        .update_one(
            doc! { "_id": user_id },
            doc! {
                "$set": { "whatsapp_verified": true },
                "$unset": { "whatsapp_code": "", "whatsapp_code_expires_at": "" },
            },
            None,
        )
        .await
        .map_err(|e| e.to_string())?;
    Ok(())
}

pub async fn confirm_whatsapp_code(state: &AppState, user_id: ObjectId, code: &str) -> Result<(), FieldErrors> {
    let mut errs = FieldErrors::new();

    let user = match find_user(state, user_id).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            errs.insert("_form".into(), "User not found.".into());
            return Err(errs);
        }
        Err(e) => {
            errs.insert("_form".into(), format!("db error: {e}"));
            return Err(errs);
        }
    };

    if let Err(msg) = check_code(&user, code, Utc::now().timestamp()) {
        errs.insert("code".into(), msg.into());
        return Err(errs);
    }

    if let Err(e) = mark_verified(state, user_id).await {
        errs.insert("_form".into(), format!("db error: {e}"));
        return Err(errs);
    }

    tracing::info!(user_id = %user_id, "whatsapp verified");
    Ok(())
}

/// Unverified account holding this phone with a live, matching code.
fn pending_code_filter(phone: &str, code: &str, now: i64) -> Document {
    doc! {
        "whatsapp_phone": phone,
        "whatsapp_verified": false,
        "whatsapp_code": code.trim(),
        "whatsapp_code_expires_at": { "$gte": now },
    }
}

/// Code replied over WhatsApp. Returns true when it verified the number.
///
/// Several unverified accounts may hold codes for one phone; the code picks the account.
pub async fn verify_by_phone(state: &AppState, phone: &str, code: &str) -> Result<bool, String> {
    let verified = users(state)
        .find_one_and_update(
            pending_code_filter(phone, code, Utc::now().timestamp()),
            doc! {
                "$set": { "whatsapp_verified": true },
                "$unset": { "whatsapp_code": "", "whatsapp_code_expires_at": "" },
            },
            None,
        )
        .await
        .map_err(|e| e.to_string())?;

    match verified {
        Some(user) => {
            tracing::info!(user_id = %user.id, "whatsapp verified by reply");
            Ok(true)
        }
        None => Ok(false),
    }
}

pub async fn remove_whatsapp(state: &AppState, user_id: ObjectId) -> Result<(), String> {
    users(state)
        .update_one(
            doc! { "_id": user_id },
            doc! {
                "$set": { "whatsapp_verified": false },
                "$unset": { "whatsapp_phone": "", "whatsapp_code": "", "whatsapp_code_expires_at": "" },
            },
            None,
        )
        .await
        .map_err(|e| e.to_string())?;
    Ok(())
}

/// STOP / START replies. Returns false when no verified user has this phone.
pub async fn set_alerts_enabled_by_phone(state: &AppState, phone: &str, enabled: bool) -> Result<bool, String> {
    let res = users(state)
        .update_one(
            doc! { "whatsapp_phone": phone, "whatsapp_verified": true },
            doc! { "$set": { "alerts.enabled": enabled } },
            None,
        )
        .await
        .map_err(|e| e.to_string())?;
    Ok(res.matched_count > 0)
}

// ---------------- Plans ----------------

pub async fn activate_plan(
    state: &AppState,
    user_id: ObjectId,
    plan: Plan,
    customer_id: Option<&str>,
    subscription_id: Option<&str>,
) -> Result<(), String> {
    let mut set = doc! { "active_plan": plan.as_str() };
    if let Some(c) = customer_id {
        set.insert("stripe_customer_id", c);
    }
    if let Some(s) = subscription_id {
        set.insert("stripe_subscription_id", s);
    }

    let res = users(state)
        .update_one(doc! { "_id": user_id }, doc! { "$set": set }, None)
        .await
        .map_err(|e| e.to_string())?;

    if res.matched_count == 0 {
        return Err(format!("user {user_id} not found"));
    }
    tracing::info!(user_id = %user_id, plan = plan.as_str(), "plan activated");
    Ok(())
}

pub async fn set_plan_by_subscription(state: &AppState, subscription_id: &str, plan: Plan) -> Result<bool, String> {
    let res = users(state)
        .update_one(
            doc! { "stripe_subscription_id": subscription_id },
            doc! { "$set": { "active_plan": plan.as_str() } },
            None,
        )
        .await
        .map_err(|e| e.to_string())?;
    Ok(res.matched_count > 0)
}

fn clear_plan_update() -> Document {
    doc! { "$set": { "active_plan": null, "stripe_subscription_id": null } }
}

pub async fn clear_plan(state: &AppState, user_id: ObjectId) -> Result<(), String> {
    users(state)
        .update_one(doc! { "_id": user_id }, clear_plan_update(), None)
        .await
        .map_err(|e| e.to_string())?;
    tracing::info!(user_id = %user_id, "plan cleared");
    Ok(())
}

pub async fn clear_plan_by_subscription(state: &AppState, subscription_id: &str) -> Result<bool, String> {
    let res = users(state)
        .update_one(doc! { "stripe_subscription_id": subscription_id }, clear_plan_update(), None)
        .await
        .map_err(|e| e.to_string())?;
    Ok(res.matched_count > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with_code(code: Option<&str>, expires_at: Option<i64>) -> User {
        User {
            id: ObjectId::new(),
            email: "ana@example.com".into(),
            name: "Ana".into(),
            password_hash: String::new(),
            active_plan: None,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            whatsapp_phone: Some("5511987654321".into()),
            whatsapp_verified: false,
            whatsapp_code: code.map(str::to_string),
            whatsapp_code_expires_at: expires_at,
            alerts: AlertPreferences::default(),
            created_at: 0,
        }
    }

    #[test]
    fn code_checks() {
        let u = user_with_code(Some("123456"), Some(1_000));
        assert!(check_code(&u, "123456", 999).is_ok());
        assert!(check_code(&u, " 123456 ", 999).is_ok());
        assert_eq!(check_code(&u, "654321", 999), Err("Invalid verification code."));
        assert!(check_code(&u, "123456", 1_001).is_err());
        assert!(check_code(&user_with_code(None, None), "123456", 0).is_err());
    }

    #[test]
    fn generated_codes_have_six_digits() {
        for _ in 0..50 {
            let c = new_code();
            assert_eq!(c.len(), 6);
            assert!(c.chars().all(|ch| ch.is_ascii_digit()));
        }
    }

    #[test]
    fn preferences_patch_only_sets_given_fields() {
        let patch = PreferencesPatch {
            enabled: Some(false),
            dividends: Some(true),
            ..Default::default()
        };
        let set = patch.to_set();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get_bool("alerts.enabled").unwrap(), false);
        assert!(PreferencesPatch::default().to_set().is_empty());
    }

    #[test]
    fn clearing_a_plan_nulls_plan_and_subscription() {
        let update = clear_plan_update();
        let set = update.get_document("$set").unwrap();
        assert!(set.contains_key("active_plan"));
        assert!(set.contains_key("stripe_subscription_id"));
        assert!(set.get("active_plan").unwrap().as_null().is_some());
    }

    #[test]
    fn phone_reply_matches_on_code_not_just_phone() {
        let f = pending_code_filter("5511987654321", " 123456 ", 1_000);
        assert_eq!(f.get_str("whatsapp_phone").unwrap(), "5511987654321");
        assert_eq!(f.get_str("whatsapp_code").unwrap(), "123456");
        assert_eq!(f.get_bool("whatsapp_verified").unwrap(), false);
        assert_eq!(
            f.get_document("whatsapp_code_expires_at").unwrap().get_i64("$gte").unwrap(),
            1_000
        );
    }
}
