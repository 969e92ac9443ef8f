use chrono::Utc;
use mongodb::bson::{doc, oid::ObjectId, Document};
use mongodb::Collection;
use serde_json::{json, Value};

use crate::{
    error::is_duplicate_key,
    models::{Plan, ProcessedStripeEvent},
    services::{
        stripe::StripeEvent,
        user_service,
    },
    templates, AppState,
};

// subscription statuses that end access
const TERMINAL_STATUSES: [&str; 3] = ["canceled", "unpaid", "incomplete_expired"];

pub async fn checkout_url(state: &AppState, user_id: ObjectId, plan: Plan) -> Result<String, String> {
    let user = user_service::find_user(state, user_id)
        .await?
        .ok_or_else(|| "user not found".to_string())?;

    if user.active_plan == Some(plan) && user.stripe_subscription_id.is_some() {
        return Err(format!("already subscribed to {}", plan.as_str()));
    }

    let session = state
        .stripe
        .create_checkout_session(
            &user.id.to_hex(),
            &user.email,
            user.stripe_customer_id.as_deref(),
            plan,
        )
        .await?;

    tracing::info!(user_id = %user.id, plan = plan.as_str(), session = %session.id, "checkout session created");
    session.url.ok_or_else(|| "Stripe returned no checkout url".to_string())
}

pub async fn portal_url(state: &AppState, user_id: ObjectId) -> Result<Option<String>, String> {
    let user = user_service::find_user(state, user_id)
        .await?
        .ok_or_else(|| "user not found".to_string())?;

    let Some(customer) = user.stripe_customer_id.as_deref() else {
        return Ok(None);
    };

    let session = state.stripe.create_portal_session(customer).await?;
    Ok(session.url)
}

/// Cancels at Stripe (when there is a subscription) and clears the plan locally.
pub async fn unsubscribe(state: &AppState, user_id: ObjectId) -> Result<(), String> {
    let user = user_service::find_user(state, user_id)
        .await?
        .ok_or_else(|| "user not found".to_string())?;

    if let Some(sub) = user.stripe_subscription_id.as_deref() {
        state.stripe.cancel_subscription(sub).await?;
    }

    user_service::clear_plan(state, user_id).await
}

// ---------------- Webhook events ----------------

#[derive(Debug, PartialEq)]
pub struct CheckoutCompletion {
    pub user_id: ObjectId,
    pub plan: Option<Plan>,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
}

fn str_at<'a>(v: &'a Value, ptr: &str) -> Option<&'a str> {
    v.pointer(ptr).and_then(Value::as_str).filter(|s| !s.is_empty())
}

pub fn parse_checkout_completion(session: &Value) -> Option<CheckoutCompletion> {
    let user_ref = str_at(session, "/client_reference_id").or_else(|| str_at(session, "/metadata/user_id"))?;
    let user_id = ObjectId::parse_str(user_ref).ok()?;

    Some(CheckoutCompletion {
        user_id,
        plan: str_at(session, "/metadata/plan").and_then(Plan::parse),
        customer_id: str_at(session, "/customer").map(str::to_string),
        subscription_id: str_at(session, "/subscription").map(str::to_string),
    })
}

pub fn subscription_price_id(subscription: &Value) -> Option<&str> {
    str_at(subscription, "/items/data/0/price/id")
}

pub fn is_terminal_status(status: &str) -> bool {
    TERMINAL_STATUSES.contains(&status)
}

// an unfinished claim older than this is treated as abandoned
const STALE_CLAIM_SECS: i64 = 300;

/// Unfinished claim on `event_id` that may be taken over at `now`.
fn stale_claim_filter(event_id: &str, now: i64) -> Document {
    doc! {
        "_id": event_id,
        "completed": false,
        "processed_at": { "$lt": now - STALE_CLAIM_SECS },
    }
}

/// Claims the event id. False when it was handled, or is being handled, by another call.
async fn claim_event(
    processed: &Collection<ProcessedStripeEvent>,
    event: &StripeEvent,
    now: i64,
) -> Result<bool, String> {
    let marker = ProcessedStripeEvent {
        id: event.id.clone(),
        event_type: event.event_type.clone(),
        processed_at: now,
        completed: false,
    };

    let Err(e) = processed.insert_one(&marker, None).await else {
        return Ok(true);
    };
    if !is_duplicate_key(&e.to_string()) {
        return Err(e.to_string());
    }

    let taken = processed
        .find_one_and_update(
            stale_claim_filter(&event.id, now),
            doc! { "$set": { "processed_at": now } },
            None,
        )
        .await
        .map_err(|e| e.to_string())?;
    if taken.is_some() {
        tracing::warn!(event_id = %event.id, "taking over a stale stripe event claim");
    }
    Ok(taken.is_some())
}

/// Returns false when the event id was handled before.
pub async fn handle_event(state: &AppState, event: &StripeEvent) -> Result<bool, String> {
    let processed = state.db.collection::<ProcessedStripeEvent>("stripe_events");

    if !claim_event(&processed, event, Utc::now().timestamp()).await? {
        tracing::info!(event_id = %event.id, "stripe event already processed");
        return Ok(false);
    }

    if let Err(e) = dispatch_event(state, event).await {
        // let Stripe redeliver; a claim left behind goes stale and is taken over
        if let Err(del) = processed.delete_one(doc! { "_id": &event.id }, None).await {
            tracing::error!(event_id = %event.id, error = %del, "stripe event claim not released");
        }
        return Err(e);
    }

    if let Err(e) = processed
        .update_one(doc! { "_id": &event.id }, doc! { "$set": { "completed": true } }, None)
        .await
    {
        tracing::error!(event_id = %event.id, error = %e, "stripe event not marked completed");
    }

    Ok(true)
}

async fn dispatch_event(state: &AppState, event: &StripeEvent) -> Result<(), String> {
    let obj = &event.data.object;

    match event.event_type.as_str() {
        "checkout.session.completed" => {
            let c = parse_checkout_completion(obj)
                .ok_or_else(|| format!("checkout session {} without a user reference", event.id))?;
            let plan = c.plan.unwrap_or(Plan::Basic);
            user_service::activate_plan(
                state,
                c.user_id,
                plan,
                c.customer_id.as_deref(),
                c.subscription_id.as_deref(),
            )
            .await
        }

        "customer.subscription.updated" => {
            let Some(sub_id) = str_at(obj, "/id") else {
                return Err("subscription without id".to_string());
            };
            let status = str_at(obj, "/status").unwrap_or("");

            if is_terminal_status(status) {
                let found = user_service::clear_plan_by_subscription(state, sub_id).await?;
                tracing::info!(subscription = sub_id, status, found, "subscription ended");
                return Ok(());
            }

            if let Some(plan) = subscription_price_id(obj).and_then(|p| state.stripe.plan_for_price(p)) {
                let found = user_service::set_plan_by_subscription(state, sub_id, plan).await?;
                tracing::info!(subscription = sub_id, plan = plan.as_str(), found, "subscription updated");
            }
            Ok(())
        }

        "customer.subscription.deleted" => {
            let Some(sub_id) = str_at(obj, "/id") else {
                return Err("subscription without id".to_string());
            };
            let found = user_service::clear_plan_by_subscription(state, sub_id).await?;
            tracing::info!(subscription = sub_id, found, "subscription deleted");
            Ok(())
        }

        "invoice.payment_failed" => {
            if let Some(sub_id) = str_at(obj, "/subscription") {
                notify_payment_failed(state, sub_id).await;
            }
            Ok(())
        }

        other => {
            tracing::debug!(event_type = other, "stripe event ignored");
            Ok(())
        }
    }
}

async fn notify_payment_failed(state: &AppState, subscription_id: &str) {
    let user = match state
        .db
        .collection::<crate::models::User>("users")
        .find_one(doc! { "stripe_subscription_id": subscription_id }, None)
        .await
    {
        Ok(Some(u)) => u,
        Ok(None) => return,
        Err(e) => {
            tracing::warn!(error = %e, "payment failure lookup failed");
            return;
        }
    };

    tracing::warn!(user_id = %user.id, subscription = subscription_id, "invoice payment failed");

    let (Some(phone), true) = (user.whatsapp_phone.as_deref(), user.whatsapp_verified) else {
        return;
    };

    let plan = user.active_plan.map(|p| p.as_str()).unwrap_or("");
    let url = format!("{}/conta", state.settings.app_base_url.trim_end_matches('/'));
    let msg = match templates::render(&state.hbs, "billing/payment_failed", &json!({ "plan": plan, "url": url })) {
        Ok(m) => m,
        Err(e) => {
            tracing::error!(error = %e, "payment failed template");
            return;
        }
    };

    if let Err(e) = state.whatsapp.send_text(phone, &msg).await {
        tracing::warn!(user_id = %user.id, error = %e, "payment failure notice not sent");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_checkout_session() {
        let uid = ObjectId::new();
        let session = json!({
            "id": "cs_test_1",
            "client_reference_id": uid.to_hex(),
            "customer": "cus_123",
            "subscription": "sub_456",
            "metadata": { "plan": "premium" }
        });

        let c = parse_checkout_completion(&session).unwrap();
        assert_eq!(
            c,
            CheckoutCompletion {
                user_id: uid,
                plan: Some(Plan::Premium),
                customer_id: Some("cus_123".into()),
                subscription_id: Some("sub_456".into()),
            }
        );
    }

    #[test]
    fn checkout_falls_back_to_metadata_user() {
        let uid = ObjectId::new();
        let session = json!({ "client_reference_id": null, "metadata": { "user_id": uid.to_hex() } });
        let c = parse_checkout_completion(&session).unwrap();
        assert_eq!(c.user_id, uid);
        assert_eq!(c.plan, None);
    }

    #[test]
    fn checkout_without_user_is_rejected() {
        assert!(parse_checkout_completion(&json!({ "customer": "cus_1" })).is_none());
        assert!(parse_checkout_completion(&json!({ "client_reference_id": "nope" })).is_none());
    }

    #[test]
    fn subscription_helpers() {
        let sub = json!({ "id": "sub_1", "status": "active", "items": { "data": [ { "price": { "id": "price_basic" } } ] } });
        assert_eq!(subscription_price_id(&sub), Some("price_basic"));
        assert!(is_terminal_status("canceled"));
        assert!(is_terminal_status("unpaid"));
        assert!(!is_terminal_status("active"));
        assert!(!is_terminal_status("past_due"));
    }

    #[test]
    fn only_unfinished_old_claims_are_taken_over() {
        let f = stale_claim_filter("evt_1", 10_000);
        assert_eq!(f.get_str("_id").unwrap(), "evt_1");
        assert_eq!(f.get_bool("completed").unwrap(), false);
        assert_eq!(
            f.get_document("processed_at").unwrap().get_i64("$lt").unwrap(),
            10_000 - STALE_CLAIM_SECS
        );
    }

    #[test]
    fn legacy_markers_count_as_completed() {
        let m: ProcessedStripeEvent = mongodb::bson::from_document(doc! {
            "_id": "evt_old",
            "event_type": "invoice.payment_failed",
            "processed_at": 1_i64,
        })
        .unwrap();
        assert!(m.completed);
    }
}
