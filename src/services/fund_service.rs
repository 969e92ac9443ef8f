use std::sync::OnceLock;

use chrono::Utc;
use futures_util::StreamExt;
use mongodb::bson::{doc, oid::ObjectId, Regex as BsonRegex};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument};
use regex::Regex;

use crate::{models::Fund, AppState};

fn ticker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z]{4}1[1-3]B?$").expect("ticker regex"))
}

/// Upper-cases and validates a FII ticker (e.g. `hglg11` -> `HGLG11`).
pub fn normalize_ticker(raw: &str) -> Option<String> {
    let t = raw.trim().to_uppercase();
    ticker_re().is_match(&t).then_some(t)
}

fn funds(state: &AppState) -> mongodb::Collection<Fund> {
    state.db.collection::<Fund>("funds")
}

pub async fn list_funds(state: &AppState, query: Option<&str>) -> Result<Vec<Fund>, String> {
    let filter = match query.map(str::trim).filter(|q| !q.is_empty()) {
        Some(q) => {
            let pattern = regex::escape(q);
            let re = BsonRegex {
                pattern,
                options: "i".to_string(),
            };
            doc! { "$or": [ { "ticker": re.clone() }, { "name": re } ] }
        }
        None => doc! {},
    };

    let opts = FindOptions::builder().sort(doc! { "ticker": 1 }).limit(200).build();
    let mut cursor = funds(state).find(filter, opts).await.map_err(|e| e.to_string())?;

    let mut items = Vec::new();
    while let Some(res) = cursor.next().await {
        items.push(res.map_err(|e| e.to_string())?);
    }
    Ok(items)
}

pub async fn get_fund(state: &AppState, ticker: &str) -> Result<Option<Fund>, String> {
    funds(state)
        .find_one(doc! { "ticker": ticker.to_uppercase() }, None)
        .await
        .map_err(|e| e.to_string())
}

pub async fn upsert_fund(state: &AppState, ticker: &str, name: &str) -> Result<Fund, String> {
    let now = Utc::now().timestamp();
    let opts = FindOneAndUpdateOptions::builder()
        .upsert(true)
        .return_document(ReturnDocument::After)
        .build();

    funds(state)
        .find_one_and_update(
            doc! { "ticker": ticker.to_uppercase() },
            doc! {
                "$set": { "name": name.trim(), "updated_at": now },
                "$setOnInsert": { "_id": ObjectId::new() },
            },
            opts,
        )
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("fund {ticker} not saved"))
}

/// Known fund, or one looked up through market data and stored.
pub async fn ensure_fund(state: &AppState, ticker: &str) -> Result<Fund, String> {
    if let Some(f) = get_fund(state, ticker).await? {
        return Ok(f);
    }

    let quote = state
        .market
        .quote(ticker)
        .await?
        .ok_or_else(|| format!("unknown ticker {ticker}"))?;

    let fund = upsert_fund(state, ticker, &quote.display_name()).await?;
    tracing::info!(ticker, "fund registered from market data");
    Ok(fund)
}

pub async fn update_quote(state: &AppState, ticker: &str, price: f64, variation: f64) -> Result<(), String> {
    funds(state)
        .update_one(
            doc! { "ticker": ticker },
            doc! { "$set": {
                "last_price": price,
                "last_variation": variation,
                "updated_at": Utc::now().timestamp(),
            } },
            None,
        )
        .await
        .map_err(|e| e.to_string())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_fii_tickers() {
        assert_eq!(normalize_ticker("hglg11").as_deref(), Some("HGLG11"));
        assert_eq!(normalize_ticker(" MXRF11 ").as_deref(), Some("MXRF11"));
        assert_eq!(normalize_ticker("KNRI12").as_deref(), Some("KNRI12"));
        assert_eq!(normalize_ticker("BTLG11B").as_deref(), Some("BTLG11B"));
    }

    #[test]
    fn rejects_non_fii_tickers() {
        assert_eq!(normalize_ticker("PETR4"), None);
        assert_eq!(normalize_ticker("AAPL"), None);
        assert_eq!(normalize_ticker("HGLG19"), None);
        assert_eq!(normalize_ticker(""), None);
    }
}
