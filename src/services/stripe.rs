use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;

use crate::{config::Settings, models::Plan};

type HmacSha256 = Hmac<Sha256>;

// seconds a signed webhook stays valid
const SIGNATURE_TOLERANCE: i64 = 300;

/// Thin client over the Stripe REST API (form-encoded requests).
#[derive(Clone)]
pub struct StripeClient {
    http: Client,
    api_url: String,
    secret_key: String,
    webhook_secret: String,
    price_basic: String,
    price_premium: String,
    app_base_url: String,
}

#[derive(Debug, Deserialize)]
pub struct StripeSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

impl StripeClient {
    pub fn new(settings: &Settings) -> Self {
        Self {
            http: Client::new(),
            api_url: settings.stripe_api_url.trim_end_matches('/').to_string(),
            secret_key: settings.stripe_secret_key.clone(),
            webhook_secret: settings.stripe_webhook_secret.clone(),
            price_basic: settings.stripe_price_basic.clone(),
            price_premium: settings.stripe_price_premium.clone(),
            app_base_url: settings.app_base_url.trim_end_matches('/').to_string(),
        }
    }

    fn has_key(&self) -> bool {
        !self.secret_key.trim().is_empty()
    }

    pub fn price_id(&self, plan: Plan) -> &str {
        match plan {
            Plan::Basic => &self.price_basic,
            Plan::Premium => &self.price_premium,
        }
    }

    pub fn plan_for_price(&self, price_id: &str) -> Option<Plan> {
        if price_id.is_empty() {
            None
        } else if price_id == self.price_basic {
            Some(Plan::Basic)
        } else if price_id == self.price_premium {
            Some(Plan::Premium)
        } else {
            None
        }
    }

    async fn post_form(&self, path: &str, params: &[(&str, String)]) -> Result<serde_json::Value, String> {
        if !self.has_key() {
            return Err("STRIPE_SECRET_KEY is missing in .env".to_string());
        }

        let res = self
            .http
            .post(format!("{}/{}", self.api_url, path))
            .bearer_auth(&self.secret_key)
            .form(params)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("Stripe {path} failed: {status} {body}"));
        }

        res.json::<serde_json::Value>().await.map_err(|e| e.to_string())
    }

    pub async fn create_checkout_session(
        &self,
        user_id: &str,
        email: &str,
        customer_id: Option<&str>,
        plan: Plan,
    ) -> Result<StripeSession, String> {
        let price = self.price_id(plan);
        if price.is_empty() {
            return Err(format!("no Stripe price configured for plan {}", plan.as_str()));
        }

        let mut params = vec![
            ("mode", "subscription".to_string()),
            ("line_items[0][price]", price.to_string()),
            ("line_items[0][quantity]", "1".to_string()),
            ("client_reference_id", user_id.to_string()),
            ("metadata[plan]", plan.as_str().to_string()),
            ("metadata[user_id]", user_id.to_string()),
            ("subscription_data[metadata][user_id]", user_id.to_string()),
            ("success_url", format!("{}/conta?checkout=success", self.app_base_url)),
            ("cancel_url", format!("{}/planos?checkout=cancel", self.app_base_url)),
        ];
        match customer_id {
            Some(c) => params.push(("customer", c.to_string())),
            None => params.push(("customer_email", email.to_string())),
        }

        let v = self.post_form("checkout/sessions", &params).await?;
        serde_json::from_value(v).map_err(|e| e.to_string())
    }

    pub async fn create_portal_session(&self, customer_id: &str) -> Result<StripeSession, String> {
        let params = [
            ("customer", customer_id.to_string()),
            ("return_url", format!("{}/conta", self.app_base_url)),
        ];
        let v = self.post_form("billing_portal/sessions", &params).await?;
        serde_json::from_value(v).map_err(|e| e.to_string())
    }

    pub async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), String> {
        if !self.has_key() {
            return Err("STRIPE_SECRET_KEY is missing in .env".to_string());
        }

        let res = self
            .http
            .delete(format!("{}/subscriptions/{}", self.api_url, subscription_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        // already gone on Stripe's side
        if res.status() == reqwest::StatusCode::NOT_FOUND {
            tracing::warn!(subscription_id, "subscription not found on Stripe, clearing locally");
            return Ok(());
        }

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(format!("Stripe cancel failed: {status} {body}"));
        }

        Ok(())
    }

    pub fn verify_webhook_signature(&self, payload: &[u8], header: &str) -> Result<bool, String> {
        verify_signature(payload, header, &self.webhook_secret, chrono::Utc::now().timestamp())
    }

    /// Verifies the signature and parses the event.
    pub fn construct_event(&self, payload: &[u8], header: &str) -> Result<StripeEvent, String> {
        if !self.verify_webhook_signature(payload, header)? {
            return Err("invalid signature".to_string());
        }
        serde_json::from_slice(payload).map_err(|e| e.to_string())
    }
}

/// `Stripe-Signature: t=<unix>,v1=<hex>[,v1=<hex>...]`. Errors on malformed headers,
/// `Ok(false)` on mismatch or a stale timestamp.
pub fn verify_signature(payload: &[u8], header: &str, secret: &str, now: i64) -> Result<bool, String> {
    if secret.is_empty() {
        return Err("STRIPE_WEBHOOK_SECRET is missing in .env".to_string());
    }

    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in header.split(',') {
        let mut it = part.trim().splitn(2, '=');
        match (it.next(), it.next()) {
            (Some("t"), Some(v)) => timestamp = v.parse().ok(),
            (Some("v1"), Some(v)) => signatures.push(v),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or("missing timestamp in signature header")?;
    if signatures.is_empty() {
        return Err("missing v1 signature in signature header".to_string());
    }

    if (now - timestamp).abs() > SIGNATURE_TOLERANCE {
        return Ok(false);
    }

    for sig in signatures {
        let Ok(expected) = hex::decode(sig) else {
            continue;
        };

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| e.to_string())?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);

        if mac.verify_slice(&expected).is_ok() {
            return Ok(true);
        }
    }

    Ok(false)
}
