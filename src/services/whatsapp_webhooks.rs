use chrono::Utc;
use futures_util::StreamExt;
use mongodb::bson::{self, doc, oid::ObjectId, Document};
use mongodb::options::UpdateOptions;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    models::{GatewayStatus, WhatsAppEvent},
    services::{alert_service, user_service, whatsapp::normalize_phone},
    templates, AppState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookKind {
    Connected,
    Disconnected,
    Received,
    Sent,
    Status,
    Presence,
}

impl WebhookKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "connected" => Some(Self::Connected),
            "disconnected" => Some(Self::Disconnected),
            "received" => Some(Self::Received),
            "sent" => Some(Self::Sent),
            "status" => Some(Self::Status),
            "presence" => Some(Self::Presence),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Received => "received",
            Self::Sent => "sent",
            Self::Status => "status",
            Self::Presence => "presence",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedMessage {
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub text: Option<TextContent>,
}

#[derive(Debug, Deserialize)]
pub struct TextContent {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub status: String,
    #[serde(default)]
    pub ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionEvent {
    #[serde(default)]
    pub instance_id: Option<String>,
    #[serde(default)]
    pub connected: Option<bool>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentCallback {
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum Reply {
    Code(String),
    Stop,
    Start,
    Other,
}

pub fn classify_reply(text: &str) -> Reply {
    let t = text.trim();
    if t.len() == 6 && t.chars().all(|c| c.is_ascii_digit()) {
        return Reply::Code(t.to_string());
    }
    match t.to_uppercase().as_str() {
        "PARAR" | "STOP" | "SAIR" => Reply::Stop,
        "VOLTAR" | "START" | "ATIVAR" => Reply::Start,
        _ => Reply::Other,
    }
}

fn phone_of(payload: &Value) -> Option<String> {
    payload
        .get("phone")
        .and_then(Value::as_str)
        .and_then(normalize_phone)
}

async fn log_event(state: &AppState, kind: WebhookKind, payload: &Value) {
    let doc = match bson::to_document(payload) {
        Ok(d) => d,
        Err(_) => {
            let mut d = Document::new();
            d.insert("raw", payload.to_string());
            d
        }
    };

    let event = WhatsAppEvent {
        id: ObjectId::new(),
        kind: kind.as_str().to_string(),
        phone: phone_of(payload),
        payload: doc,
        received_at: Utc::now().timestamp(),
    };

    if let Err(e) = state
        .db
        .collection::<WhatsAppEvent>("whatsapp_events")
        .insert_one(&event, None)
        .await
    {
        tracing::warn!(kind = kind.as_str(), error = %e, "whatsapp event not logged");
    }
}

/// Handles one gateway callback. Returns a short description of what was done.
pub async fn handle(state: &AppState, kind: WebhookKind, payload: Value) -> Result<&'static str, String> {
    log_event(state, kind, &payload).await;

    match kind {
        WebhookKind::Connected | WebhookKind::Disconnected => {
            let ev: ConnectionEvent = serde_json::from_value(payload).map_err(|e| e.to_string())?;
            let connected = ev.connected.unwrap_or(kind == WebhookKind::Connected);
            let instance = ev
                .instance_id
                .unwrap_or_else(|| state.settings.whatsapp_instance_id.clone());

            state
                .db
                .collection::<Document>("gateway_status")
                .update_one(
                    doc! { "_id": &instance },
                    doc! { "$set": {
                        "connected": connected,
                        "phone": ev.phone,
                        "updated_at": Utc::now().timestamp(),
                    } },
                    UpdateOptions::builder().upsert(true).build(),
                )
                .await
                .map_err(|e| e.to_string())?;

            tracing::info!(instance = %instance, connected, "whatsapp gateway connection changed");
            Ok("connection_recorded")
        }

        WebhookKind::Received => {
            let msg: ReceivedMessage = serde_json::from_value(payload).map_err(|e| e.to_string())?;
            handle_received(state, msg).await
        }

        WebhookKind::Sent => {
            let cb: SentCallback = serde_json::from_value(payload).map_err(|e| e.to_string())?;
            let Some(message_id) = cb.message_id.as_deref().filter(|id| !id.is_empty()) else {
                return Ok("logged");
            };
            let matched = alert_service::confirm_sent(state, message_id).await?;
            tracing::debug!(phone = ?cb.phone, message_id, matched, "whatsapp message sent callback");
            Ok(if matched { "sent_recorded" } else { "logged" })
        }

        WebhookKind::Status => {
            let st: StatusUpdate = serde_json::from_value(payload).map_err(|e| e.to_string())?;
            let updated = alert_service::update_delivery_status(state, &st.ids, &st.status.to_uppercase()).await?;
            tracing::debug!(status = %st.status, ids = st.ids.len(), updated, "delivery status updated");
            Ok("status_updated")
        }

        WebhookKind::Presence => Ok("logged"),
    }
}

async fn handle_received(state: &AppState, msg: ReceivedMessage) -> Result<&'static str, String> {
    if msg.from_me || msg.is_group {
        return Ok("ignored");
    }
    let Some(phone) = normalize_phone(&msg.phone) else {
        return Ok("ignored");
    };
    let text = msg.text.map(|t| t.message).unwrap_or_default();

    let (outcome, reply_tpl) = match classify_reply(&text) {
        Reply::Code(code) => {
            if user_service::verify_by_phone(state, &phone, &code).await? {
                ("verified", Some("whatsapp/verified"))
            } else {
                ("code_rejected", None)
            }
        }
        Reply::Stop => {
            if user_service::set_alerts_enabled_by_phone(state, &phone, false).await? {
                ("alerts_paused", Some("whatsapp/alerts_paused"))
            } else {
                ("unknown_sender", None)
            }
        }
        Reply::Start => {
            if user_service::set_alerts_enabled_by_phone(state, &phone, true).await? {
                ("alerts_resumed", Some("whatsapp/alerts_resumed"))
            } else {
                ("unknown_sender", None)
            }
        }
        Reply::Other => ("logged", None),
    };

    if let Some(tpl) = reply_tpl {
        match templates::render(&state.hbs, tpl, &json!({})) {
            Ok(reply) => {
                if let Err(e) = state.whatsapp.send_text(&phone, &reply).await {
                    tracing::warn!(error = %e, "reply not sent");
                }
            }
            Err(e) => tracing::error!(template = tpl, error = %e, "reply template"),
        }
    }

    tracing::info!(outcome, message_id = ?msg.message_id, "whatsapp message handled");
    Ok(outcome)
}

pub async fn gateway_statuses(state: &AppState) -> Result<Vec<GatewayStatus>, String> {
    let mut cursor = state
        .db
        .collection::<GatewayStatus>("gateway_status")
        .find(doc! {}, None)
        .await
        .map_err(|e| e.to_string())?;

    let mut items = Vec::new();
    while let Some(res) = cursor.next().await {
        items.push(res.map_err(|e| e.to_string())?);
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_replies() {
        assert_eq!(classify_reply(" 123456 "), Reply::Code("123456".into()));
        assert_eq!(classify_reply("parar"), Reply::Stop);
        assert_eq!(classify_reply("STOP"), Reply::Stop);
        assert_eq!(classify_reply("Voltar"), Reply::Start);
        assert_eq!(classify_reply("12345"), Reply::Other);
        assert_eq!(classify_reply("oi, tudo bem?"), Reply::Other);
    }

    #[test]
    fn parses_received_payload() {
        let raw = json!({
            "isStatusReply": false,
            "phone": "5511987654321",
            "fromMe": false,
            "momment": 1632228638000u64,
            "messageId": "A20DA9C0183A2D35A260F53F5D2B9244",
            "isGroup": false,
            "senderName": "Ana",
            "text": { "message": "PARAR" }
        });
        let msg: ReceivedMessage = serde_json::from_value(raw).unwrap();
        assert_eq!(msg.phone, "5511987654321");
        assert!(!msg.from_me);
        assert_eq!(msg.text.unwrap().message, "PARAR");
    }

    #[test]
    fn parses_status_payload() {
        let raw = json!({ "status": "READ", "ids": ["999999999999999999999"], "phone": "5544999999999", "type": "MessageStatusCallback" });
        let st: StatusUpdate = serde_json::from_value(raw).unwrap();
        assert_eq!(st.status, "READ");
        assert_eq!(st.ids.len(), 1);
    }

    #[test]
    fn webhook_kinds_round_trip_names() {
        for name in ["connected", "disconnected", "received", "sent", "status", "presence"] {
            assert_eq!(WebhookKind::parse(name).unwrap().as_str(), name);
        }
        assert!(WebhookKind::parse("chats").is_none());
    }

    #[test]
    fn parses_sent_callback_message_id() {
        let raw = serde_json::json!({ "phone": "5511987654321", "messageId": "3EB0C767D097B7C7", "momment": 1632228638000_i64 });
        let cb: SentCallback = serde_json::from_value(raw).unwrap();
        assert_eq!(cb.message_id.as_deref(), Some("3EB0C767D097B7C7"));
    }
}
