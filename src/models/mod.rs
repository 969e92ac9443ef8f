pub mod user;
pub mod fund;
pub mod follow;
pub mod report;
pub mod alert;
pub mod webhook;

pub use user::{AlertPreferences, CurrentUser, Plan, User};
pub use fund::Fund;
pub use follow::{Follow, DEFAULT_VARIATION_THRESHOLD};
pub use report::{Dividend, Report};
pub use alert::{AlertKind, SentAlert};
pub use webhook::{GatewayStatus, ProcessedStripeEvent, WhatsAppEvent};
