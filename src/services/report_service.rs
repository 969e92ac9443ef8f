use chrono::{NaiveDate, Utc};
use futures_util::StreamExt;
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::options::FindOptions;
use serde::{Deserialize, Serialize};

use crate::{
    error::{is_duplicate_key, FieldErrors},
    models::{Dividend, Report},
    services::{
        alert_service::{self, AlertEvent, FanOutSummary},
        fund_service,
    },
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct NewReport {
    pub ticker: String,
    pub kind: String,
    pub title: String,
    pub url: String,
    pub reference_date: String,
    // optional fund name, used when the fund is not known yet
    #[serde(default)]
    pub fund_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewDividend {
    pub ticker: String,
    pub amount: f64,
    pub record_date: String,
    pub payment_date: String,
    #[serde(default)]
    pub fund_name: Option<String>,
}

/// Outcome of an ingestion. `fan_out` is `None` when the fan-out itself failed.
#[derive(Debug, Serialize)]
pub struct Recorded<T> {
    pub item: T,
    pub created: bool,
    pub fan_out: Option<FanOutSummary>,
}

fn valid_date(s: &str) -> bool {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").is_ok()
}

pub fn validate_report(input: &NewReport) -> Result<String, FieldErrors> {
    let mut errs = FieldErrors::new();

    let ticker = fund_service::normalize_ticker(&input.ticker);
    if ticker.is_none() {
        errs.insert("ticker".into(), "Invalid FII ticker.".into());
    }
    if input.kind.trim().is_empty() {
        errs.insert("kind".into(), "Document kind is required.".into());
    }
    if input.title.trim().is_empty() {
        errs.insert("title".into(), "Title is required.".into());
    }
    let url = input.url.trim();
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        errs.insert("url".into(), "A http(s) link is required.".into());
    }
    if !valid_date(&input.reference_date) {
        errs.insert("reference_date".into(), "Use the YYYY-MM-DD format.".into());
    }

    match ticker {
        Some(t) if errs.is_empty() => Ok(t),
        _ => Err(errs),
    }
}

pub fn validate_dividend(input: &NewDividend) -> Result<String, FieldErrors> {
    let mut errs = FieldErrors::new();

    let ticker = fund_service::normalize_ticker(&input.ticker);
    if ticker.is_none() {
        errs.insert("ticker".into(), "Invalid FII ticker.".into());
    }
    if !input.amount.is_finite() || input.amount <= 0.0 {
        errs.insert("amount".into(), "Amount must be greater than zero.".into());
    }
    if !valid_date(&input.record_date) {
        errs.insert("record_date".into(), "Use the YYYY-MM-DD format.".into());
    }
    if !valid_date(&input.payment_date) {
        errs.insert("payment_date".into(), "Use the YYYY-MM-DD format.".into());
    }

    match ticker {
        Some(t) if errs.is_empty() => Ok(t),
        _ => Err(errs),
    }
}

async fn ensure_fund_row(state: &AppState, ticker: &str, name: Option<&str>) {
    let res = match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(n) => fund_service::upsert_fund(state, ticker, n).await.map(|_| ()),
        None => fund_service::ensure_fund(state, ticker).await.map(|_| ()),
    };
    if let Err(e) = res {
        // documents are still recorded for unknown funds
        tracing::warn!(ticker, error = %e, "fund row not ensured");
    }
}

/// `Ok(false)` when the document was stored before.
fn stored(res: Result<(), String>) -> Result<bool, FieldErrors> {
    match res {
        Ok(()) => Ok(true),
        Err(e) if is_duplicate_key(&e) => Ok(false),
        Err(e) => {
            let mut errs = FieldErrors::new();
            errs.insert("_form".into(), format!("db error: {e}"));
            Err(errs)
        }
    }
}

// Runs on redelivery too: recipients already notified are skipped by the
// `sent_alerts` unique index, the ones whose send failed get another try.
async fn notify(state: &AppState, event: &AlertEvent) -> Option<FanOutSummary> {
    match alert_service::fan_out(state, event).await {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::error!(ticker = event.ticker(), kind = event.kind().as_str(), error = %e, "document fan-out failed");
            None
        }
    }
}

pub async fn record_report(state: &AppState, input: NewReport) -> Result<Recorded<Report>, FieldErrors> {
    let ticker = validate_report(&input)?;

    let report = Report {
        id: ObjectId::new(),
        ticker: ticker.clone(),
        kind: input.kind.trim().to_lowercase(),
        title: input.title.trim().to_string(),
        url: input.url.trim().to_string(),
        reference_date: input.reference_date.trim().to_string(),
        created_at: Utc::now().timestamp(),
    };

    let res = state
        .db
        .collection::<Report>("reports")
        .insert_one(&report, None)
        .await
        .map(|_| ())
        .map_err(|e| e.to_string());
    let created = stored(res)?;

    if created {
        ensure_fund_row(state, &ticker, input.fund_name.as_deref()).await;
    } else {
        tracing::debug!(ticker = %ticker, title = %report.title, "report already known");
    }

    let fan_out = notify(state, &AlertEvent::NewReport(report.clone())).await;
    Ok(Recorded { item: report, created, fan_out })
}

pub async fn record_dividend(state: &AppState, input: NewDividend) -> Result<Recorded<Dividend>, FieldErrors> {
    let ticker = validate_dividend(&input)?;

    let dividend = Dividend {
        id: ObjectId::new(),
        ticker: ticker.clone(),
        amount: input.amount,
        record_date: input.record_date.trim().to_string(),
        payment_date: input.payment_date.trim().to_string(),
        created_at: Utc::now().timestamp(),
    };

    let res = state
        .db
        .collection::<Dividend>("dividends")
        .insert_one(&dividend, None)
        .await
        .map(|_| ())
        .map_err(|e| e.to_string());
    let created = stored(res)?;

    if created {
        ensure_fund_row(state, &ticker, input.fund_name.as_deref()).await;
    } else {
        tracing::debug!(ticker = %ticker, record_date = %dividend.record_date, "dividend already known");
    }

    let fan_out = notify(state, &AlertEvent::NewDividend(dividend.clone())).await;
    Ok(Recorded { item: dividend, created, fan_out })
}

pub async fn list_reports(state: &AppState, ticker: &str, limit: i64) -> Result<Vec<Report>, String> {
    let opts = FindOptions::builder()
        .sort(doc! { "reference_date": -1, "created_at": -1 })
        .limit(limit)
        .build();
    let mut cursor = state
        .db
        .collection::<Report>("reports")
        .find(doc! { "ticker": ticker.to_uppercase() }, opts)
        .await
        .map_err(|e| e.to_string())?;

    let mut items = Vec::new();
    while let Some(res) = cursor.next().await {
        items.push(res.map_err(|e| e.to_string())?);
    }
    Ok(items)
}

pub async fn list_dividends(state: &AppState, ticker: &str, limit: i64) -> Result<Vec<Dividend>, String> {
    let opts = FindOptions::builder()
        .sort(doc! { "record_date": -1 })
        .limit(limit)
        .build();
    let mut cursor = state
        .db
        .collection::<Dividend>("dividends")
        .find(doc! { "ticker": ticker.to_uppercase() }, opts)
        .await
        .map_err(|e| e.to_string())?;

    let mut items = Vec::new();
    while let Some(res) = cursor.next().await {
        items.push(res.map_err(|e| e.to_string())?);
    }
    Ok(items)
}

/// Admin: deletes stored reports, all of them or one ticker's.
pub async fn clear_reports(state: &AppState, ticker: Option<&str>) -> Result<u64, String> {
    let filter = match ticker {
        Some(t) => doc! { "ticker": t.to_uppercase() },
        None => doc! {},
    };
    let res = state
        .db
        .collection::<Report>("reports")
        .delete_many(filter, None)
        .await
        .map_err(|e| e.to_string())?;

    tracing::info!(deleted = res.deleted_count, ticker = ticker.unwrap_or("*"), "reports cleared");
    Ok(res.deleted_count)
}
