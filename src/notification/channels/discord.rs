//! Discord webhook 渠道

use crate::config::DiscordConfig;
use crate::notification::backend::{ensure_success, send_cancellable, Backend, DeliveryError, DeliverySettings};
use crate::notification::formatter::MessageFormatter;
use crate::notification::payload::NotificationPayload;
use crate::notification::truncate::{truncate, truncate_title, TruncateDirection};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Discord `content` 上限
pub const DISCORD_MAX_CONTENT: usize = 2000;

pub struct DiscordChannel {
    config: DiscordConfig,
    client: reqwest::Client,
}

impl DiscordChannel {
    /// 创建 Discord webhook 渠道
    pub fn new(config: DiscordConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    /// 构造请求体，整条消息不超过 2000 字符
    pub fn build_request_body(
        username: Option<&str>,
        payload: &NotificationPayload,
        direction: TruncateDirection,
    ) -> Value {
        let title = format!("**{}**", truncate_title(&payload.title));
        let budget = DISCORD_MAX_CONTENT.saturating_sub(title.chars().count() + 2);
        let body = truncate(&MessageFormatter::body_with_footer(payload), budget, direction);

        let mut request = json!({
            "content": MessageFormatter::plain_text(&title, &body),
            "allowed_mentions": { "parse": [] },
        });
        if let Some(name) = username {
            request["username"] = Value::String(name.to_string());
        }
        request
    }
}

#[async_trait]
impl Backend for DiscordChannel {
    async fn deliver(
        &self,
        settings: &DeliverySettings,
        payload: &NotificationPayload,
        cancel: CancellationToken,
    ) -> Result<(), DeliveryError> {
        let body = Self::build_request_body(
            self.config.username.as_deref(),
            payload,
            settings.truncate_direction,
        );

        debug!(channel = "discord", "Sending Discord notification");
        let request = self.client.post(&self.config.webhook_url).json(&body);
        let response = send_cancellable(request, &cancel).await?;
        ensure_success(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::payload::EventCategory;

    #[test]
    fn test_request_body_with_username() {
        let payload = NotificationPayload::new(EventCategory::ClarificationRequest, "Question for you", "Which DB?");
        let body = DiscordChannel::build_request_body(Some("agent-bot"), &payload, TruncateDirection::End);
        assert_eq!(body["content"], "**Question for you**\n\nWhich DB?");
        assert_eq!(body["username"], "agent-bot");
    }

    #[test]
    fn test_request_body_fits_limit() {
        let payload = NotificationPayload::new(EventCategory::TaskComplete, "Done", "z".repeat(3000));
        let body = DiscordChannel::build_request_body(None, &payload, TruncateDirection::Start);
        let content = body["content"].as_str().unwrap();
        assert_eq!(content.chars().count(), DISCORD_MAX_CONTENT);
        assert!(content.contains("\n\n...zzz"));
        assert!(body.get("username").is_none());
    }
}
