use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::Settings;

/// Client for the Z-API style WhatsApp send gateway.
#[derive(Clone)]
pub struct WhatsAppClient {
    http: Client,
    base_url: String,
    instance_id: String,
    token: String,
    client_token: String,
    max_attempts: u32,
    retry_base: Duration,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResult {
    #[serde(default)]
    pub zaap_id: Option<String>,
    pub message_id: String,
}

enum SendError {
    Retryable(String),
    Fatal(String),
}

impl WhatsAppClient {
    pub fn new(settings: &Settings) -> Self {
        Self {
            http: Client::new(),
            base_url: settings.whatsapp_api_url.trim_end_matches('/').to_string(),
            instance_id: settings.whatsapp_instance_id.clone(),
            token: settings.whatsapp_token.clone(),
            client_token: settings.whatsapp_client_token.clone(),
            max_attempts: settings.whatsapp_max_attempts.max(1),
            retry_base: Duration::from_millis(settings.whatsapp_retry_base_ms),
        }
    }

    fn is_configured(&self) -> bool {
        !self.instance_id.trim().is_empty() && !self.token.trim().is_empty()
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "{}/instances/{}/token/{}/{}",
            self.base_url, self.instance_id, self.token, action
        )
    }

    /// Sends a text message, retrying transport errors, 429 and 5xx.
    pub async fn send_text(&self, phone: &str, message: &str) -> Result<SendResult, String> {
        if !self.is_configured() {
            return Err("WHATSAPP_INSTANCE_ID / WHATSAPP_TOKEN are missing in .env".to_string());
        }

        let mut attempt = 0;
        loop {
            attempt += 1;

            match self.send_once(phone, message).await {
                Ok(res) => {
                    tracing::debug!(phone, attempt, message_id = %res.message_id, "whatsapp message sent");
                    return Ok(res);
                }
                Err(SendError::Fatal(e)) => {
                    tracing::warn!(phone, attempt, error = %e, "whatsapp send rejected");
                    return Err(e);
                }
                Err(SendError::Retryable(e)) => {
                    if attempt >= self.max_attempts {
                        tracing::warn!(phone, attempt, error = %e, "whatsapp send failed, giving up");
                        return Err(e);
                    }
                    let delay = backoff_delay(self.retry_base, attempt);
                    tracing::info!(phone, attempt, delay_ms = delay.as_millis() as u64, error = %e, "whatsapp send failed, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn send_once(&self, phone: &str, message: &str) -> Result<SendResult, SendError> {
        let mut req = self
            .http
            .post(self.endpoint("send-text"))
            .json(&json!({ "phone": phone, "message": message }));

        if !self.client_token.trim().is_empty() {
            req = req.header("Client-Token", &self.client_token);
        }

        let res = req
            .send()
            .await
            .map_err(|e| SendError::Retryable(e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            let msg = format!("whatsapp send failed: {status} {body}");
            return Err(if is_retryable(status) {
                SendError::Retryable(msg)
            } else {
                SendError::Fatal(msg)
            });
        }

        res.json::<SendResult>()
            .await
            .map_err(|e| SendError::Fatal(e.to_string()))
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// base, 2*base, 4*base, ... capped at 30s.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 1u32 << attempt.saturating_sub(1).min(16);
    base.saturating_mul(factor).min(Duration::from_secs(30))
}

/// Digits only, with the Brazilian `55` prefix. `None` when the result can't be a mobile/landline.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    let digits = digits.trim_start_matches('0').to_string();

    let full = match digits.len() {
        10 | 11 => format!("55{digits}"),
        12 | 13 if digits.starts_with("55") => digits,
        _ => return None,
    };

    Some(full)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_brazilian_numbers() {
        assert_eq!(normalize_phone("(11) 98765-4321").as_deref(), Some("5511987654321"));
        assert_eq!(normalize_phone("+55 21 3456-7890").as_deref(), Some("552134567890"));
        assert_eq!(normalize_phone("011 98765 4321").as_deref(), Some("5511987654321"));
        assert_eq!(normalize_phone("5511987654321").as_deref(), Some("5511987654321"));
    }

    #[test]
    fn rejects_garbage_numbers() {
        assert_eq!(normalize_phone(""), None);
        assert_eq!(normalize_phone("12345"), None);
        assert_eq!(normalize_phone("4412345678901"), None);
        assert_eq!(normalize_phone("not a phone"), None);
    }

    #[test]
    fn retry_classification() {
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(StatusCode::BAD_GATEWAY));
        assert!(!is_retryable(StatusCode::BAD_REQUEST));
        assert!(!is_retryable(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(1000));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(2000));
        assert_eq!(backoff_delay(base, 20), Duration::from_secs(30));
    }

    #[test]
    fn parses_send_response() {
        let r: SendResult = serde_json::from_str(
            r#"{"zaapId":"3999984263738042930CD6ECDE9VDWSA","messageId":"D241XXXX732339502B68","id":"D241XXXX732339502B68"}"#,
        )
        .unwrap();
        assert_eq!(r.message_id, "D241XXXX732339502B68");
    }
}
