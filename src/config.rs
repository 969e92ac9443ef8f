use std::env;

#[derive(Debug, Clone)]
pub struct Settings {
    pub mongodb_uri: String,
    pub mongodb_db: String,
    pub host: String,
    pub port: u16,

    pub jwt_secret: String,
    pub jwt_cookie_name: String,
    pub cookie_secure: bool,

    pub app_base_url: String,
    pub admin_emails: Vec<String>,

    // shared secrets for machine callers
    pub webhook_secret: String,
    pub cron_secret: String,

    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub stripe_price_basic: String,
    pub stripe_price_premium: String,
    pub stripe_api_url: String,

    pub whatsapp_api_url: String,
    pub whatsapp_instance_id: String,
    pub whatsapp_token: String,
    pub whatsapp_client_token: String,
    pub whatsapp_max_attempts: u32,
    pub whatsapp_retry_base_ms: u64,

    pub market_data_api_url: String,
    pub market_data_token: String,
}

impl Settings {
    pub fn is_admin(&self, email: &str) -> bool {
        self.admin_emails
            .iter()
            .any(|a| a.eq_ignore_ascii_case(email.trim()))
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(key, value = %raw, "invalid value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

pub fn load() -> Settings {
    // Loads .env if present (no crash if missing)
    dotenvy::dotenv().ok();

    let admin_emails = var_or("ADMIN_EMAILS", "")
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();

    Settings {
        mongodb_uri: var_or("MONGODB_URI", "mongodb://localhost:27017"),
        mongodb_db: var_or("MONGODB_DB", "fiialerts"),
        host: var_or("HOST", "127.0.0.1"),
        port: parse_or("PORT", 3000),

        jwt_secret: var_or("JWT_SECRET", "change-me-dev-secret"),
        jwt_cookie_name: var_or("JWT_COOKIE_NAME", "auth"),
        cookie_secure: parse_or("COOKIE_SECURE", false),

        app_base_url: var_or("APP_BASE_URL", "http://localhost:3000"),
        admin_emails,

        webhook_secret: var_or("WEBHOOK_SECRET", ""),
        cron_secret: var_or("CRON_SECRET", ""),

        stripe_secret_key: var_or("STRIPE_SECRET_KEY", ""),
        stripe_webhook_secret: var_or("STRIPE_WEBHOOK_SECRET", ""),
        stripe_price_basic: var_or("STRIPE_PRICE_BASIC", ""),
        stripe_price_premium: var_or("STRIPE_PRICE_PREMIUM", ""),
        stripe_api_url: var_or("STRIPE_API_URL", "https://api.stripe.com/v1"),

        whatsapp_api_url: var_or("WHATSAPP_API_URL", "https://api.z-api.io"),
        whatsapp_instance_id: var_or("WHATSAPP_INSTANCE_ID", ""),
        whatsapp_token: var_or("WHATSAPP_TOKEN", ""),
        whatsapp_client_token: var_or("WHATSAPP_CLIENT_TOKEN", ""),
        whatsapp_max_attempts: parse_or("WHATSAPP_MAX_ATTEMPTS", 3u32).max(1),
        whatsapp_retry_base_ms: parse_or("WHATSAPP_RETRY_BASE_MS", 500u64),

        market_data_api_url: var_or("MARKET_DATA_API_URL", "https://brapi.dev/api"),
        market_data_token: var_or("MARKET_DATA_TOKEN", ""),
    }
}
