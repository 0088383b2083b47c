//! Telegram Bot 渠道
//!
//! 通过 Bot API `sendMessage` 发送纯文本消息。

use crate::config::TelegramConfig;
use crate::notification::backend::{send_cancellable, Backend, DeliveryError, DeliverySettings};
use crate::notification::formatter::MessageFormatter;
use crate::notification::payload::NotificationPayload;
use crate::notification::truncate::{truncate, truncate_title, TruncateDirection};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Telegram 单条消息上限
pub const TELEGRAM_MAX_TEXT: usize = 4096;

const API_BASE: &str = "https://api.telegram.org";

/// Telegram 渠道
pub struct TelegramChannel {
    config: TelegramConfig,
    client: reqwest::Client,
    api_base: String,
}

impl TelegramChannel {
    /// 创建 Telegram Bot 渠道
    pub fn new(config: TelegramConfig, client: reqwest::Client) -> Self {
        Self {
            config,
            client,
            api_base: API_BASE.to_string(),
        }
    }

    /// 替换 API 地址（自建 Bot API 服务）
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    fn send_message_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.config.bot_token)
    }

    /// 标题在前，正文按方向截断，整体不超过上限
    pub fn build_request_body(
        chat_id: &str,
        payload: &NotificationPayload,
        direction: TruncateDirection,
    ) -> Value {
        let title = truncate_title(&payload.title);
        // 标题 + 两个换行
        let budget = TELEGRAM_MAX_TEXT.saturating_sub(title.chars().count() + 2);
        let body = truncate(&MessageFormatter::body_with_footer(payload), budget, direction);

        json!({
            "chat_id": chat_id,
            "text": MessageFormatter::plain_text(&title, &body),
            "disable_web_page_preview": true,
        })
    }
}

#[async_trait]
impl Backend for TelegramChannel {
    async fn deliver(
        &self,
        settings: &DeliverySettings,
        payload: &NotificationPayload,
        cancel: CancellationToken,
    ) -> Result<(), DeliveryError> {
        let body = Self::build_request_body(&self.config.chat_id, payload, settings.truncate_direction);

        debug!(channel = "telegram", chat_id = %self.config.chat_id, "Sending Telegram notification");
        let request = self.client.post(self.send_message_url()).json(&body);
        let response = send_cancellable(request, &cancel).await?;

        let status = response.status();
        let resp_body: Value = response.json().await.unwrap_or(Value::Null);

        if status.is_success() && resp_body.get("ok") == Some(&Value::Bool(true)) {
            return Ok(());
        }

        let description = resp_body
            .get("description")
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown Telegram API error")
            .to_string();

        if status.is_success() {
            Err(DeliveryError::Rejected(description))
        } else {
            Err(DeliveryError::Status {
                status: status.as_u16(),
                body: description,
            })
        }
    }
}
