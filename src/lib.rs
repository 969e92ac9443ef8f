//! Library entrypoint for FiiAlerts.
//!
//! Integration tests under `tests/` import the app state, routers,
//! controllers and services from here.

pub mod config;
pub mod error;
pub mod models;

#[path = "middleware/auth.rs"]
pub mod auth;

pub mod services;

#[path = "views/templates.rs"]
pub mod templates;

pub mod controllers;
pub mod routes;

#[derive(Clone)]
pub struct AppState {
    pub hbs: templates::Hbs,
    pub db: mongodb::Database,
    pub settings: config::Settings,
    pub market: services::market_data::MarketDataClient,
    pub whatsapp: services::whatsapp::WhatsAppClient,
    pub stripe: services::stripe::StripeClient,
}

impl AppState {
    pub fn new(db: mongodb::Database, settings: config::Settings) -> Self {
        Self {
            hbs: templates::build_handlebars(),
            market: services::market_data::MarketDataClient::new(&settings),
            whatsapp: services::whatsapp::WhatsAppClient::new(&settings),
            stripe: services::stripe::StripeClient::new(&settings),
            db,
            settings,
        }
    }
}
