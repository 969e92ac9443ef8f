use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Basic,
    Premium,
}

impl Plan {
    pub fn parse(s: &str) -> Option<Plan> {
        match s.trim().to_lowercase().as_str() {
            "basic" => Some(Plan::Basic),
            "premium" => Some(Plan::Premium),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Basic => "basic",
            Plan::Premium => "premium",
        }
    }
}

/// Global alert switches. Per-fund switches live on [`super::Follow`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertPreferences {
    pub enabled: bool,
    pub price_variation: bool,
    pub reports: bool,
    pub dividends: bool,
}

impl Default for AlertPreferences {
    fn default() -> Self {
        Self {
            enabled: true,
            price_variation: true,
            reports: true,
            dividends: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub email: String,
    pub name: String,
    pub password_hash: String,

    #[serde(default)]
    pub active_plan: Option<Plan>,
    #[serde(default)]
    pub stripe_customer_id: Option<String>,
    #[serde(default)]
    pub stripe_subscription_id: Option<String>,

    #[serde(default)]
    pub whatsapp_phone: Option<String>,
    #[serde(default)]
    pub whatsapp_verified: bool,
    #[serde(default)]
    pub whatsapp_code: Option<String>,
    #[serde(default)]
    pub whatsapp_code_expires_at: Option<i64>,

    #[serde(default)]
    pub alerts: AlertPreferences,

    pub created_at: i64,
}

/// What request handlers see of the logged-in user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: ObjectId,
    pub email: String,
    pub name: String,
    pub active_plan: Option<Plan>,
}

impl From<User> for CurrentUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            name: u.name,
            active_plan: u.active_plan,
        }
    }
}
