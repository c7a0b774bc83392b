// Notification transport implementations
pub mod discord;
pub mod log;
pub mod webhook;

pub use discord::DiscordTransport;
pub use log::LogTransport;
pub use webhook::WebhookTransport;
