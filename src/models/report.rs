use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

/// An official filing published for a fund.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub ticker: String,
    // "relatorio_gerencial", "fato_relevante", ...
    pub kind: String,
    pub title: String,
    pub url: String,
    // YYYY-MM-DD
    pub reference_date: String,

    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dividend {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub ticker: String,
    // BRL per quota
    pub amount: f64,
    // "data com", YYYY-MM-DD
    pub record_date: String,
    pub payment_date: String,

    pub created_at: i64,
}
