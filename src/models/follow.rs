use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

pub const DEFAULT_VARIATION_THRESHOLD: f64 = 5.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Follow {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub user_id: ObjectId,
    pub ticker: String,

    pub notify: bool,
    pub notify_price_variation: bool,
    pub notify_reports: bool,
    pub notify_dividends: bool,

    // percent, compared against the absolute daily variation
    pub variation_threshold: f64,

    pub created_at: i64,
}

impl Follow {
    pub fn new(user_id: ObjectId, ticker: &str, now: i64) -> Self {
        Self {
            id: ObjectId::new(),
            user_id,
            ticker: ticker.to_uppercase(),
            notify: true,
            notify_price_variation: true,
            notify_reports: true,
            notify_dividends: true,
            variation_threshold: DEFAULT_VARIATION_THRESHOLD,
            created_at: now,
        }
    }
}
