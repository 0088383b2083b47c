//! 后端 trait 定义 - 每个推送/机器人/webhook 服务实现一次

use super::payload::NotificationPayload;
use super::truncate::TruncateDirection;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// 投递失败原因
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("provider rejected message: {0}")]
    Rejected(String),

    #[error("delivery cancelled")]
    Cancelled,

    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),

    #[error("configuration error: {0}")]
    Config(String),
}

/// 后端投递时使用的已解析设置
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliverySettings {
    /// 渠道级覆盖，否则取全局默认
    pub truncate_direction: TruncateDirection,
}

/// 通知后端
///
/// 成功（2xx）返回 `Ok(())`，其余情况（非 2xx、传输错误、取消）返回错误。
/// 实现应在 `cancel` 触发时尽快放弃请求。
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    async fn deliver(
        &self,
        settings: &DeliverySettings,
        payload: &NotificationPayload,
        cancel: CancellationToken,
    ) -> Result<(), DeliveryError>;
}

/// 已启用的后端
#[derive(Clone)]
pub struct BackendDescriptor {
    /// 诊断用名称
    pub name: String,
    pub backend: Arc<dyn Backend>,
    pub settings: DeliverySettings,
}

impl BackendDescriptor {
    /// 创建后端描述
    pub fn new(name: impl Into<String>, backend: Arc<dyn Backend>, settings: DeliverySettings) -> Self {
        Self {
            name: name.into(),
            backend,
            settings,
        }
    }
}

impl std::fmt::Debug for BackendDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendDescriptor")
            .field("name", &self.name)
            .field("settings", &self.settings)
            .finish()
    }
}

/// 让请求与取消信号赛跑，供各渠道复用
pub async fn send_cancellable(
    request: reqwest::RequestBuilder,
    cancel: &CancellationToken,
) -> Result<reqwest::Response, DeliveryError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(DeliveryError::Cancelled),
        resp = request.send() => Ok(resp?),
    }
}

/// 非 2xx 视为失败，读取响应体作为原因
pub async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, DeliveryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    Err(DeliveryError::Status {
        status: status.as_u16(),
        body,
    })
}
