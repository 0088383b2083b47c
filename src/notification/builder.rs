//! 通知系统构建器 - 根据配置创建后端并组装调度器

use super::backend::{BackendDescriptor, DeliverySettings};
use super::channels::{DiscordChannel, NtfyChannel, SlackChannel, TelegramChannel, WebhookChannel};
use super::error_log::{ErrorLog, FailureLog};
use super::scheduler::{DispatchScheduler, DELIVERY_TIMEOUT};
use super::truncate::TruncateDirection;
use crate::config::NotifierConfig;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// 通知系统构建器
pub struct NotificationBuilder {
    failure_log: Option<Arc<dyn FailureLog>>,
    extra_backends: Vec<BackendDescriptor>,
}

impl NotificationBuilder {
    pub fn new() -> Self {
        Self {
            failure_log: None,
            extra_backends: Vec::new(),
        }
    }

    /// 设置失败日志，默认写 ~/.config/agent-notifier/errors.log
    pub fn failure_log(mut self, log: Arc<dyn FailureLog>) -> Self {
        self.failure_log = Some(log);
        self
    }

    /// 追加一个自定义后端
    pub fn backend(mut self, descriptor: BackendDescriptor) -> Self {
        self.extra_backends.push(descriptor);
        self
    }

    /// 为配置中启用的每个渠道创建后端
    pub fn backends_from_config(config: &NotifierConfig) -> Result<Vec<BackendDescriptor>> {
        if !config.enabled {
            info!("Notifications disabled by configuration");
            return Ok(Vec::new());
        }

        // 单次请求超时略大于调度器截止时间，由调度器负责取消
        let client = reqwest::Client::builder()
            .user_agent(concat!("agent-notifier/", env!("CARGO_PKG_VERSION")))
            .timeout(DELIVERY_TIMEOUT * 2)
            .build()
            .context("Failed to create HTTP client")?;

        let mut backends = Vec::new();

        if config.ntfy.enabled {
            info!(channel = "ntfy", topic = %config.ntfy.topic, "Enabling ntfy channel");
            backends.push(BackendDescriptor::new(
                "ntfy",
                Arc::new(NtfyChannel::new(config.ntfy.clone(), client.clone())),
                settings(config, config.ntfy.truncate_direction),
            ));
        }

        if config.telegram.enabled {
            info!(channel = "telegram", chat_id = %config.telegram.chat_id, "Enabling Telegram channel");
            backends.push(BackendDescriptor::new(
                "telegram",
                Arc::new(TelegramChannel::new(config.telegram.clone(), client.clone())),
                settings(config, config.telegram.truncate_direction),
            ));
        }

        if config.discord.enabled {
            info!(channel = "discord", "Enabling Discord channel");
            backends.push(BackendDescriptor::new(
                "discord",
                Arc::new(DiscordChannel::new(config.discord.clone(), client.clone())),
                settings(config, config.discord.truncate_direction),
            ));
        }

        if config.slack.enabled {
            info!(channel = "slack", "Enabling Slack channel");
            backends.push(BackendDescriptor::new(
                "slack",
                Arc::new(SlackChannel::new(config.slack.clone(), client.clone())),
                settings(config, config.slack.truncate_direction),
            ));
        }

        if config.webhook.enabled {
            info!(channel = "webhook", url = %config.webhook.url, "Enabling webhook channel");
            backends.push(BackendDescriptor::new(
                "webhook",
                Arc::new(WebhookChannel::new(config.webhook.clone(), client)),
                settings(config, config.webhook.truncate_direction),
            ));
        }

        Ok(backends)
    }

    /// 构建调度器
    pub fn build(self, config: &NotifierConfig) -> Result<DispatchScheduler> {
        let mut backends = Self::backends_from_config(config)?;
        backends.extend(self.extra_backends);

        let failure_log: Arc<dyn FailureLog> = match self.failure_log {
            Some(log) => log,
            None => Arc::new(ErrorLog::new(ErrorLog::default_path())),
        };

        Ok(DispatchScheduler::new(backends, config.delay(), failure_log))
    }
}

impl Default for NotificationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn settings(config: &NotifierConfig, provider: Option<TruncateDirection>) -> DeliverySettings {
    DeliverySettings {
        truncate_direction: config.effective_direction(provider),
    }
}
