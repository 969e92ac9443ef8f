pub mod db_init;
pub mod market_data;
pub mod stripe;
pub mod whatsapp;

pub mod alert_service;
pub mod auth_service;
pub mod billing_service;
pub mod follow_service;
pub mod fund_service;
pub mod price_monitor;
pub mod report_service;
pub mod user_service;
pub mod whatsapp_webhooks;
