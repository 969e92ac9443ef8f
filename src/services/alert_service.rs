//! Alert fan-out: match an event against follows and user preferences,
//! deduplicate against the `sent_alerts` log and dispatch over WhatsApp.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use futures_util::StreamExt;
use mongodb::bson::{doc, oid::ObjectId, Bson, Document};
use mongodb::options::FindOptions;
use serde::Serialize;
use serde_json::json;

use crate::{
    error::is_duplicate_key,
    models::{AlertKind, Dividend, Follow, Report, SentAlert, User},
    services::{follow_service, user_service},
    templates::{self, Hbs},
    AppState,
};

#[derive(Debug, Clone)]
pub enum AlertEvent {
    PriceVariation { ticker: String, price: f64, variation: f64 },
    NewReport(Report),
    NewDividend(Dividend),
}

impl AlertEvent {
    pub fn ticker(&self) -> &str {
        match self {
            AlertEvent::PriceVariation { ticker, .. } => ticker,
            AlertEvent::NewReport(r) => &r.ticker,
            AlertEvent::NewDividend(d) => &d.ticker,
        }
    }

    pub fn kind(&self) -> AlertKind {
        match self {
            AlertEvent::PriceVariation { .. } => AlertKind::PriceVariation,
            AlertEvent::NewReport(_) => AlertKind::Report,
            AlertEvent::NewDividend(_) => AlertKind::Dividend,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recipient {
    pub user_id: ObjectId,
    pub phone: String,
    pub threshold: f64,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct FanOutSummary {
    pub matched: usize,
    pub sent: usize,
    pub skipped_duplicate: usize,
    pub failed: usize,
}

fn user_wants(user: &User, kind: AlertKind) -> bool {
    if user.active_plan.is_none() || !user.whatsapp_verified || !user.alerts.enabled {
        return false;
    }
    match kind {
        AlertKind::PriceVariation => user.alerts.price_variation,
        AlertKind::Report => user.alerts.reports,
        AlertKind::Dividend => user.alerts.dividends,
    }
}

fn follow_wants(follow: &Follow, event: &AlertEvent) -> bool {
    if !follow.notify || !follow.ticker.eq_ignore_ascii_case(event.ticker()) {
        return false;
    }
    match event {
        AlertEvent::PriceVariation { variation, .. } => {
            follow.notify_price_variation && variation.is_finite() && variation.abs() >= follow.variation_threshold
        }
        AlertEvent::NewReport(_) => follow.notify_reports,
        AlertEvent::NewDividend(_) => follow.notify_dividends,
    }
}

/// Users to notify for `event`, at most once each, in follow order.
pub fn select_recipients(event: &AlertEvent, follows: &[Follow], users: &[User]) -> Vec<Recipient> {
    let by_id: HashMap<ObjectId, &User> = users.iter().map(|u| (u.id, u)).collect();
    let kind = event.kind();

    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for f in follows {
        if !follow_wants(f, event) {
            continue;
        }
        let Some(user) = by_id.get(&f.user_id) else {
            continue;
        };
        if !user_wants(user, kind) {
            continue;
        }
        let Some(phone) = user.whatsapp_phone.as_deref().filter(|p| !p.is_empty()) else {
            continue;
        };
        if !seen.insert(user.id) {
            continue;
        }

        out.push(Recipient {
            user_id: user.id,
            phone: phone.to_string(),
            threshold: f.variation_threshold,
        });
    }

    out
}

/// B3 trading day. Brazil has no DST since 2019, so a fixed UTC-3 offset holds.
pub fn sao_paulo_date(now: DateTime<Utc>) -> NaiveDate {
    (now - Duration::hours(3)).date_naive()
}

/// Key deduplicating an event per user in `sent_alerts`.
pub fn dedup_reference(event: &AlertEvent, today: NaiveDate) -> String {
    match event {
        AlertEvent::PriceVariation { .. } => today.format("%Y-%m-%d").to_string(),
        AlertEvent::NewReport(r) => format!("{}:{}:{}", r.reference_date, r.kind, r.title),
        AlertEvent::NewDividend(d) => format!("{}:{:.4}", d.record_date, d.amount),
    }
}

/// Brazilian decimal formatting: `1234.5` -> `1234,50`.
pub fn fmt_br(x: f64) -> String {
    format!("{:.2}", x).replace('.', ",")
}

pub fn render_message(hbs: &Hbs, event: &AlertEvent, recipient: &Recipient) -> Result<String, String> {
    match event {
        AlertEvent::PriceVariation { ticker, price, variation } => {
            let tpl = if *variation >= 0.0 { "alerts/price_up" } else { "alerts/price_down" };
            templates::render(
                hbs,
                tpl,
                &json!({
                    "ticker": ticker,
                    "price": fmt_br(*price),
                    "variation": fmt_br(variation.abs()),
                    "threshold": fmt_br(recipient.threshold),
                }),
            )
        }
        AlertEvent::NewReport(r) => templates::render(
            hbs,
            "alerts/report",
            &json!({ "ticker": r.ticker, "title": r.title, "date": r.reference_date, "url": r.url }),
        ),
        AlertEvent::NewDividend(d) => templates::render(
            hbs,
            "alerts/dividend",
            &json!({
                "ticker": d.ticker,
                "amount": fmt_br(d.amount),
                "record_date": d.record_date,
                "payment_date": d.payment_date,
            }),
        ),
    }
}

fn sent_alerts(state: &AppState) -> mongodb::Collection<SentAlert> {
    state.db.collection::<SentAlert>("sent_alerts")
}

enum Claim {
    Claimed(ObjectId),
    AlreadySent,
}

async fn claim(state: &AppState, recipient: &Recipient, event: &AlertEvent, reference: &str) -> Result<Claim, String> {
    let row = SentAlert {
        id: ObjectId::new(),
        user_id: recipient.user_id,
        ticker: event.ticker().to_string(),
        kind: event.kind(),
        reference: reference.to_string(),
        message_id: None,
        delivery_status: None,
        sent_at: Utc::now().timestamp(),
    };

    match sent_alerts(state).insert_one(&row, None).await {
        Ok(_) => Ok(Claim::Claimed(row.id)),
        Err(e) if is_duplicate_key(&e.to_string()) => Ok(Claim::AlreadySent),
        Err(e) => Err(e.to_string()),
    }
}

async fn deliver(state: &AppState, event: &AlertEvent, recipient: &Recipient, claim_id: ObjectId) -> Result<(), String> {
    let message = render_message(&state.hbs, event, recipient)?;
    let res = state.whatsapp.send_text(&recipient.phone, &message).await?;

    sent_alerts(state)
        .update_one(
            doc! { "_id": claim_id },
            doc! { "$set": { "message_id": &res.message_id, "delivery_status": "SENT" } },
            None,
        )
        .await
        .map_err(|e| e.to_string())?;
    Ok(())
}

/// Notifies every matching user once. Per-recipient failures are counted, not propagated.
pub async fn fan_out(state: &AppState, event: &AlertEvent) -> Result<FanOutSummary, String> {
    let ticker = event.ticker().to_uppercase();
    let follows = follow_service::notifying_follows_for_ticker(state, &ticker).await?;

    let mut summary = FanOutSummary::default();
    if follows.is_empty() {
        return Ok(summary);
    }

    let user_ids: Vec<ObjectId> = follows.iter().map(|f| f.user_id).collect();
    let users = user_service::find_many(state, &user_ids).await?;

    let recipients = select_recipients(event, &follows, &users);
    summary.matched = recipients.len();

    let reference = dedup_reference(event, sao_paulo_date(Utc::now()));

    for r in &recipients {
        let claim_id = match claim(state, r, event, &reference).await {
            Ok(Claim::Claimed(id)) => id,
            Ok(Claim::AlreadySent) => {
                summary.skipped_duplicate += 1;
                continue;
            }
            Err(e) => {
                tracing::error!(user_id = %r.user_id, ticker = %ticker, error = %e, "alert claim failed");
                summary.failed += 1;
                continue;
            }
        };

        match deliver(state, event, r, claim_id).await {
            Ok(()) => summary.sent += 1,
            Err(e) => {
                tracing::warn!(user_id = %r.user_id, ticker = %ticker, error = %e, "alert not delivered");
                summary.failed += 1;
                // release the claim so the next run retries
                if let Err(e) = sent_alerts(state).delete_one(doc! { "_id": claim_id }, None).await {
                    tracing::error!(error = %e, "could not release alert claim");
                }
            }
        }
    }

    tracing::info!(
        ticker = %ticker,
        kind = event.kind().as_str(),
        matched = summary.matched,
        sent = summary.sent,
        duplicates = summary.skipped_duplicate,
        failed = summary.failed,
        "alert fan-out finished"
    );

    Ok(summary)
}

/// Gateway "sent" callback. A later status (RECEIVED, READ, ...) is never downgraded.
fn sent_confirmation_filter(message_id: &str) -> Document {
    doc! { "message_id": message_id, "delivery_status": { "$in": [Bson::Null, "SENT"] } }
}

pub async fn confirm_sent(state: &AppState, message_id: &str) -> Result<bool, String> {
    let res = sent_alerts(state)
        .update_one(
            sent_confirmation_filter(message_id),
            doc! { "$set": { "delivery_status": "SENT" } },
            None,
        )
        .await
        .map_err(|e| e.to_string())?;
    Ok(res.matched_count > 0)
}

pub async fn update_delivery_status(state: &AppState, message_ids: &[String], status: &str) -> Result<u64, String> {
    if message_ids.is_empty() {
        return Ok(0);
    }
    let res = sent_alerts(state)
        .update_many(
            doc! { "message_id": { "$in": message_ids.to_vec() } },
            doc! { "$set": { "delivery_status": status } },
            None,
        )
        .await
        .map_err(|e| e.to_string())?;
    Ok(res.modified_count)
}

pub async fn list_sent_alerts(state: &AppState, user_id: ObjectId, limit: i64) -> Result<Vec<SentAlert>, String> {
    let opts = FindOptions::builder().sort(doc! { "sent_at": -1 }).limit(limit).build();
    let mut cursor = sent_alerts(state)
        .find(doc! { "user_id": user_id }, opts)
        .await
        .map_err(|e| e.to_string())?;

    let mut items = Vec::new();
    while let Some(res) = cursor.next().await {
        items.push(res.map_err(|e| e.to_string())?);
    }
    Ok(items)
}

/// Admin: wipes the dedup log, optionally for one ticker.
pub async fn clear_sent_alerts(state: &AppState, ticker: Option<&str>) -> Result<u64, String> {
    let filter = match ticker {
        Some(t) => doc! { "ticker": t.to_uppercase() },
        None => doc! {},
    };
    let res = sent_alerts(state)
        .delete_many(filter, None)
        .await
        .map_err(|e| e.to_string())?;
    Ok(res.deleted_count)
}
