use chrono::Utc;
use futures_util::StreamExt;
use mongodb::bson::{doc, oid::ObjectId, Bson, Document};
use mongodb::options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument};
use serde::Deserialize;

use crate::{
    error::{is_duplicate_key, FieldErrors},
    models::{Follow, Plan},
    services::fund_service,
    AppState,
};

/// How many funds a user may follow. `None` means unlimited.
pub fn follow_limit(plan: Option<Plan>) -> Option<usize> {
    match plan {
        None => Some(3),
        Some(Plan::Basic) => Some(20),
        Some(Plan::Premium) => None,
    }
}

pub fn validate_threshold(value: f64) -> Result<f64, &'static str> {
    if !value.is_finite() || value <= 0.0 || value > 100.0 {
        return Err("Threshold must be between 0 and 100 percent.");
    }
    Ok(value)
}

fn follows(state: &AppState) -> mongodb::Collection<Follow> {
    state.db.collection::<Follow>("follows")
}

async fn collect(mut cursor: mongodb::Cursor<Follow>) -> Result<Vec<Follow>, String> {
    let mut items = Vec::new();
    while let Some(res) = cursor.next().await {
        items.push(res.map_err(|e| e.to_string())?);
    }
    Ok(items)
}

pub async fn list_follows(state: &AppState, user_id: ObjectId) -> Result<Vec<Follow>, String> {
    let opts = FindOptions::builder().sort(doc! { "ticker": 1 }).build();
    let cursor = follows(state)
        .find(doc! { "user_id": user_id }, opts)
        .await
        .map_err(|e| e.to_string())?;
    collect(cursor).await
}

/// Follows that may notify for a ticker, oldest first.
pub async fn notifying_follows_for_ticker(state: &AppState, ticker: &str) -> Result<Vec<Follow>, String> {
    let opts = FindOptions::builder().sort(doc! { "created_at": 1 }).build();
    let cursor = follows(state)
        .find(doc! { "ticker": ticker, "notify": true }, opts)
        .await
        .map_err(|e| e.to_string())?;
    collect(cursor).await
}

/// Distinct tickers with at least one notifying follow.
pub async fn notifying_tickers(state: &AppState) -> Result<Vec<String>, String> {
    let values = follows(state)
        .distinct("ticker", doc! { "notify": true, "notify_price_variation": true }, None)
        .await
        .map_err(|e| e.to_string())?;

    let mut tickers: Vec<String> = values
        .into_iter()
        .filter_map(|v| match v {
            Bson::String(s) => Some(s),
            _ => None,
        })
        .collect();
    tickers.sort();
    Ok(tickers)
}

pub async fn follow(
    state: &AppState,
    user_id: ObjectId,
    plan: Option<Plan>,
    raw_ticker: &str,
) -> Result<Follow, FieldErrors> {
    let mut errs = FieldErrors::new();

    let Some(ticker) = fund_service::normalize_ticker(raw_ticker) else {
        errs.insert("ticker".into(), "Please enter a valid FII ticker (e.g. HGLG11).".into());
        return Err(errs);
    };

    let col = follows(state);

    // following twice is a no-op
    match col.find_one(doc! { "user_id": user_id, "ticker": &ticker }, None).await {
        Ok(Some(existing)) => return Ok(existing),
        Ok(None) => {}
        Err(e) => {
            errs.insert("_form".into(), format!("db error: {e}"));
            return Err(errs);
        }
    }

    if let Some(limit) = follow_limit(plan) {
        let count = match col.count_documents(doc! { "user_id": user_id }, None).await {
            Ok(c) => c as usize,
            Err(e) => {
                errs.insert("_form".into(), format!("db error: {e}"));
                return Err(errs);
            }
        };
        if count >= limit {
            errs.insert(
                "ticker".into(),
                format!("Your plan allows following up to {limit} funds. Upgrade to follow more."),
            );
            return Err(errs);
        }
    }

    if let Err(e) = fund_service::ensure_fund(state, &ticker).await {
        tracing::warn!(ticker = %ticker, error = %e, "fund lookup failed");
        errs.insert("ticker".into(), format!("Could not find fund {ticker}."));
        return Err(errs);
    }

    let item = Follow::new(user_id, &ticker, Utc::now().timestamp());
    if let Err(e) = col.insert_one(&item, None).await {
        if is_duplicate_key(&e.to_string()) {
            if let Ok(Some(existing)) = col.find_one(doc! { "user_id": user_id, "ticker": &ticker }, None).await {
                return Ok(existing);
            }
        }
        errs.insert("_form".into(), format!("db error: {e}"));
        return Err(errs);
    }

    tracing::info!(user_id = %user_id, ticker = %ticker, "fund followed");
    Ok(item)
}

/// Returns false when the user did not follow the ticker.
pub async fn unfollow(state: &AppState, user_id: ObjectId, ticker: &str) -> Result<bool, String> {
    let res = follows(state)
        .delete_one(doc! { "user_id": user_id, "ticker": ticker.to_uppercase() }, None)
        .await
        .map_err(|e| e.to_string())?;
    Ok(res.deleted_count > 0)
}

#[derive(Debug, Default, Deserialize)]
pub struct FollowSettings {
    pub notify: Option<bool>,
    pub notify_price_variation: Option<bool>,
    pub notify_reports: Option<bool>,
    pub notify_dividends: Option<bool>,
    pub variation_threshold: Option<f64>,
}

impl FollowSettings {
    fn to_set(&self) -> Result<Document, FieldErrors> {
        let mut set = Document::new();
        if let Some(v) = self.notify {
            set.insert("notify", v);
        }
        if let Some(v) = self.notify_price_variation {
            set.insert("notify_price_variation", v);
        }
        if let Some(v) = self.notify_reports {
            set.insert("notify_reports", v);
        }
        if let Some(v) = self.notify_dividends {
            set.insert("notify_dividends", v);
        }
        if let Some(v) = self.variation_threshold {
            match validate_threshold(v) {
                Ok(t) => {
                    set.insert("variation_threshold", t);
                }
                Err(msg) => {
                    let mut errs = FieldErrors::new();
                    errs.insert("variation_threshold".into(), msg.into());
                    return Err(errs);
                }
            }
        }
        Ok(set)
    }
}

pub async fn update_follow(
    state: &AppState,
    user_id: ObjectId,
    ticker: &str,
    settings: &FollowSettings,
) -> Result<Option<Follow>, FieldErrors> {
    let set = settings.to_set()?;
    if set.is_empty() {
        let mut errs = FieldErrors::new();
        errs.insert("_form".into(), "Nothing to update.".into());
        return Err(errs);
    }

    let opts = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();

    follows(state)
        .find_one_and_update(
            doc! { "user_id": user_id, "ticker": ticker.to_uppercase() },
            doc! { "$set": set },
            opts,
        )
        .await
        .map_err(|e| {
            let mut errs = FieldErrors::new();
            errs.insert("_form".into(), format!("db error: {e}"));
            errs
        })
}

/// Admin bulk update. No filter means every follow.
pub async fn update_thresholds(
    state: &AppState,
    ticker: Option<&str>,
    user_id: Option<ObjectId>,
    threshold: f64,
) -> Result<u64, String> {
    let threshold = validate_threshold(threshold)?;

    let mut filter = Document::new();
    if let Some(t) = ticker {
        filter.insert("ticker", t.to_uppercase());
    }
    if let Some(u) = user_id {
        filter.insert("user_id", u);
    }

    let res = follows(state)
        .update_many(filter, doc! { "$set": { "variation_threshold": threshold } }, None)
        .await
        .map_err(|e| e.to_string())?;

    tracing::info!(modified = res.modified_count, threshold, "thresholds updated");
    Ok(res.modified_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_limits() {
        assert_eq!(follow_limit(None), Some(3));
        assert_eq!(follow_limit(Some(Plan::Basic)), Some(20));
        assert_eq!(follow_limit(Some(Plan::Premium)), None);
    }

    #[test]
    fn threshold_bounds() {
        assert_eq!(validate_threshold(2.5), Ok(2.5));
        assert_eq!(validate_threshold(100.0), Ok(100.0));
        assert!(validate_threshold(0.0).is_err());
        assert!(validate_threshold(-1.0).is_err());
        assert!(validate_threshold(100.1).is_err());
        assert!(validate_threshold(f64::NAN).is_err());
    }

    #[test]
    fn settings_reject_bad_threshold() {
        let s = FollowSettings {
            variation_threshold: Some(0.0),
            ..Default::default()
        };
        let errs = s.to_set().unwrap_err();
        assert!(errs.contains_key("variation_threshold"));
    }

    #[test]
    fn settings_build_partial_update() {
        let s = FollowSettings {
            notify_reports: Some(false),
            variation_threshold: Some(3.0),
            ..Default::default()
        };
        let set = s.to_set().unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get_f64("variation_threshold").unwrap(), 3.0);
    }
}
