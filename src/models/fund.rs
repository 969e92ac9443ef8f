use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fund {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    // always upper-case, e.g. "HGLG11"
    pub ticker: String,
    pub name: String,

    #[serde(default)]
    pub last_price: Option<f64>,
    #[serde(default)]
    pub last_variation: Option<f64>,

    pub updated_at: i64,
}
