//! ntfy 推送渠道

use crate::config::NtfyConfig;
use crate::notification::backend::{ensure_success, send_cancellable, Backend, DeliveryError, DeliverySettings};
use crate::notification::formatter::MessageFormatter;
use crate::notification::payload::{EventCategory, NotificationPayload};
use crate::notification::truncate::{truncate, truncate_title, TruncateDirection};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// ntfy 消息体上限
pub const NTFY_MAX_BODY: usize = 4096;

/// ntfy 推送渠道
pub struct NtfyChannel {
    config: NtfyConfig,
    client: reqwest::Client,
}

impl NtfyChannel {
    /// 创建 ntfy 渠道
    pub fn new(config: NtfyConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    /// 发布地址：`{server}/{topic}`
    pub fn topic_url(&self) -> String {
        format!(
            "{}/{}",
            self.config.server.trim_end_matches('/'),
            self.config.topic
        )
    }

    /// 未配置时按类别决定：需要人处理的用高优先级
    pub fn priority_for(&self, category: EventCategory) -> u8 {
        self.config.priority.unwrap_or(match category {
            EventCategory::Error | EventCategory::PermissionRequest => 5,
            EventCategory::ClarificationRequest => 4,
            EventCategory::TaskComplete | EventCategory::SubtaskComplete => 3,
        })
    }

    /// 配置的标签加上类别标签
    pub fn tags_for(&self, category: EventCategory) -> String {
        let mut tags = self.config.tags.clone();
        let emoji = match category {
            EventCategory::TaskComplete | EventCategory::SubtaskComplete => "white_check_mark",
            EventCategory::Error => "x",
            EventCategory::PermissionRequest => "lock",
            EventCategory::ClarificationRequest => "question",
        };
        tags.push(emoji.to_string());
        tags.join(",")
    }

    /// 消息体带耗时尾注，按方向截断
    pub fn build_body(payload: &NotificationPayload, direction: TruncateDirection) -> String {
        truncate(&MessageFormatter::body_with_footer(payload), NTFY_MAX_BODY, direction)
    }
}

#[async_trait]
impl Backend for NtfyChannel {
    async fn deliver(
        &self,
        settings: &DeliverySettings,
        payload: &NotificationPayload,
        cancel: CancellationToken,
    ) -> Result<(), DeliveryError> {
        let title = truncate_title(&payload.title);
        let body = Self::build_body(payload, settings.truncate_direction);

        let mut request = self
            .client
            .post(self.topic_url())
            .header("Title", title)
            .header("Priority", self.priority_for(payload.category).to_string())
            .header("Tags", self.tags_for(payload.category))
            .body(body);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        debug!(channel = "ntfy", topic = %self.config.topic, "Sending ntfy notification");
        let response = send_cancellable(request, &cancel).await?;
        ensure_success(response).await?;
        Ok(())
    }
}
