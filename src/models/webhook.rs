use mongodb::bson::{oid::ObjectId, Document};
use serde::{Deserialize, Serialize};

/// Raw log of a gateway webhook call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppEvent {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    // connected | disconnected | received | sent | status | presence
    pub kind: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub payload: Document,

    pub received_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayStatus {
    // gateway instance id
    #[serde(rename = "_id")]
    pub id: String,

    pub connected: bool,
    #[serde(default)]
    pub phone: Option<String>,

    pub updated_at: i64,
}

/// Stripe event claimed by a webhook call. `completed` is set once handling succeeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedStripeEvent {
    #[serde(rename = "_id")]
    pub id: String,

    pub event_type: String,
    // claim time, refreshed when a stale claim is taken over
    pub processed_at: i64,
    #[serde(default = "completed_default")]
    pub completed: bool,
}

// markers written before the flag existed were only kept on success
fn completed_default() -> bool {
    true
}
