//! 通用 JSON webhook 渠道
//!
//! 把载荷序列化为 JSON POST 到配置的地址，可附加自定义 header。

use crate::config::WebhookConfig;
use crate::notification::backend::{ensure_success, send_cancellable, Backend, DeliveryError, DeliverySettings};
use crate::notification::payload::NotificationPayload;
use crate::notification::truncate::{truncate, truncate_title, TruncateDirection};
use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// webhook 正文上限
pub const WEBHOOK_MAX_BODY: usize = 8192;

/// webhook 请求载荷
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookBody<'a> {
    pub event: &'static str,
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_seconds: Option<u64>,
    pub timestamp: i64,
}

impl<'a> WebhookBody<'a> {
    /// 从载荷构造 JSON 请求体
    pub fn from_payload(payload: &'a NotificationPayload, direction: TruncateDirection) -> Self {
        Self {
            event: payload.category.as_str(),
            title: truncate_title(&payload.title),
            body: truncate(&payload.body, WEBHOOK_MAX_BODY, direction),
            project: payload.project_label.as_deref(),
            session_id: payload.session_id.as_deref(),
            elapsed_seconds: payload.elapsed_seconds,
            timestamp: payload.created_at_ms,
        }
    }
}

pub struct WebhookChannel {
    config: WebhookConfig,
    client: reqwest::Client,
}

impl WebhookChannel {
    /// 创建通用 webhook 渠道
    pub fn new(config: WebhookConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }
}

#[async_trait]
impl Backend for WebhookChannel {
    async fn deliver(
        &self,
        settings: &DeliverySettings,
        payload: &NotificationPayload,
        cancel: CancellationToken,
    ) -> Result<(), DeliveryError> {
        let body = WebhookBody::from_payload(payload, settings.truncate_direction);

        let mut request = self.client.post(&self.config.url).json(&body);
        for (key, value) in &self.config.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        debug!(channel = "webhook", url = %self.config.url, "Sending webhook notification");
        let response = send_cancellable(request, &cancel).await?;
        ensure_success(response).await?;
        Ok(())
    }
}
