//! Slack incoming webhook 渠道

use crate::config::SlackConfig;
use crate::notification::backend::{ensure_success, send_cancellable, Backend, DeliveryError, DeliverySettings};
use crate::notification::formatter::MessageFormatter;
use crate::notification::payload::NotificationPayload;
use crate::notification::truncate::{truncate, truncate_title, TruncateDirection};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Slack section 文本上限
pub const SLACK_MAX_TEXT: usize = 3000;

pub struct SlackChannel {
    config: SlackConfig,
    client: reqwest::Client,
}

impl SlackChannel {
    /// 创建 Slack incoming webhook 渠道
    pub fn new(config: SlackConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    /// 构造 `text` 请求体
    pub fn build_request_body(payload: &NotificationPayload, direction: TruncateDirection) -> Value {
        let title = format!("*{}*", truncate_title(&payload.title));
        let budget = SLACK_MAX_TEXT.saturating_sub(title.chars().count() + 2);
        let body = truncate(&MessageFormatter::body_with_footer(payload), budget, direction);

        json!({ "text": MessageFormatter::plain_text(&title, &body) })
    }
}

#[async_trait]
impl Backend for SlackChannel {
    async fn deliver(
        &self,
        settings: &DeliverySettings,
        payload: &NotificationPayload,
        cancel: CancellationToken,
    ) -> Result<(), DeliveryError> {
        let body = Self::build_request_body(payload, settings.truncate_direction);

        debug!(channel = "slack", "Sending Slack notification");
        let request = self.client.post(&self.config.webhook_url).json(&body);
        let response = send_cancellable(request, &cancel).await?;
        ensure_success(response).await?;
        Ok(())
    }
}
