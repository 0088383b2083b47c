//! 具体渠道实现

pub mod discord;
pub mod ntfy;
pub mod slack;
pub mod telegram;
pub mod webhook;

pub use discord::DiscordChannel;
pub use ntfy::NtfyChannel;
pub use slack::SlackChannel;
pub use telegram::TelegramChannel;
pub use webhook::WebhookChannel;
