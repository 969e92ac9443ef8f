use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    PriceVariation,
    Report,
    Dividend,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::PriceVariation => "price_variation",
            AlertKind::Report => "report",
            AlertKind::Dividend => "dividend",
        }
    }
}

/// Dedup log entry. Unique on (user_id, ticker, kind, reference).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentAlert {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub user_id: ObjectId,
    pub ticker: String,
    pub kind: AlertKind,
    pub reference: String,

    // gateway id, set once the send succeeded
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub delivery_status: Option<String>,

    pub sent_at: i64,
}
