//! 配置加载 - 分层 JSON 合并、环境变量替换、校验
//!
//! 加载顺序（后者覆盖前者，对象逐键合并）：
//! 1. 全局 `~/.config/agent-notifier/config.json`
//! 2. 项目 `<cwd>/.agent-notifier.json`
//! 3. `--config` 或 `AGENT_NOTIFIER_CONFIG` 指定的文件
//!
//! 字符串值中的 `${VAR}` 在加载时替换为环境变量。

use crate::notification::payload::EventCategory;
use crate::notification::truncate::TruncateDirection;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

/// 显式配置文件的环境变量
pub const CONFIG_ENV: &str = "AGENT_NOTIFIER_CONFIG";

/// 项目级配置文件名
pub const PROJECT_CONFIG_FILE: &str = ".agent-notifier.json";

/// 配置错误
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Schema(#[from] serde_json::Error),

    #[error("environment variable '{0}' is not set")]
    MissingEnvVar(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// 顶层配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotifierConfig {
    /// 总开关
    pub enabled: bool,
    /// 可延迟类别的合并延迟（秒），校验后只保留非负整数
    pub delay_seconds: f64,
    /// 全局截断方向，渠道可覆盖
    pub truncate_direction: TruncateDirection,
    /// 按类别开关，缺省为开启
    pub events: BTreeMap<String, bool>,
    pub ntfy: NtfyConfig,
    pub telegram: TelegramConfig,
    pub discord: DiscordConfig,
    pub slack: SlackConfig,
    pub webhook: WebhookConfig,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delay_seconds: 0.0,
            truncate_direction: TruncateDirection::End,
            events: BTreeMap::new(),
            ntfy: NtfyConfig::default(),
            telegram: TelegramConfig::default(),
            discord: DiscordConfig::default(),
            slack: SlackConfig::default(),
            webhook: WebhookConfig::default(),
        }
    }
}

/// ntfy 推送
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NtfyConfig {
    pub enabled: bool,
    pub server: String,
    pub topic: String,
    pub token: Option<String>,
    /// 1 (min) - 5 (max)，未设置时按类别决定
    pub priority: Option<u8>,
    pub tags: Vec<String>,
    pub truncate_direction: Option<TruncateDirection>,
}

impl Default for NtfyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server: "https://ntfy.sh".to_string(),
            topic: String::new(),
            token: None,
            priority: None,
            tags: Vec::new(),
            truncate_direction: None,
        }
    }
}

/// Telegram Bot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TelegramConfig {
    pub enabled: bool,
    pub bot_token: String,
    pub chat_id: String,
    pub truncate_direction: Option<TruncateDirection>,
}

/// Discord webhook
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiscordConfig {
    pub enabled: bool,
    pub webhook_url: String,
    pub username: Option<String>,
    pub truncate_direction: Option<TruncateDirection>,
}

/// Slack incoming webhook
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SlackConfig {
    pub enabled: bool,
    pub webhook_url: String,
    pub truncate_direction: Option<TruncateDirection>,
}

/// 通用 JSON webhook
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebhookConfig {
    pub enabled: bool,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub truncate_direction: Option<TruncateDirection>,
}

impl NotifierConfig {
    /// 按默认分层加载
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_from_paths(&Self::default_layers(explicit))
    }

    /// 默认分层路径（不存在的文件在加载时跳过）
    pub fn default_layers(explicit: Option<&Path>) -> Vec<PathBuf> {
        let mut layers = Vec::new();

        if let Some(home) = dirs::home_dir() {
            layers.push(home.join(".config").join("agent-notifier").join("config.json"));
        }
        if let Ok(cwd) = std::env::current_dir() {
            layers.push(cwd.join(PROJECT_CONFIG_FILE));
        }
        match explicit {
            Some(path) => layers.push(path.to_path_buf()),
            None => {
                if let Ok(path) = std::env::var(CONFIG_ENV) {
                    if !path.trim().is_empty() {
                        layers.push(PathBuf::from(path));
                    }
                }
            }
        }

        layers
    }

    /// 依次合并给定文件，然后替换环境变量并校验
    pub fn load_from_paths(paths: &[PathBuf]) -> Result<Self, ConfigError> {
        let mut merged = Value::Object(Map::new());

        for path in paths {
            if !path.exists() {
                debug!(path = %path.display(), "Config layer not found, skipping");
                continue;
            }
            let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
            let layer: Value = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?;
            debug!(path = %path.display(), "Config layer loaded");
            merge_json(&mut merged, layer);
        }

        Self::from_value(merged)
    }

    /// 从已合并的 JSON 构造并校验
    pub fn from_value(mut value: Value) -> Result<Self, ConfigError> {
        resolve_env_refs(&mut value)?;
        let mut config: NotifierConfig = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// 校验并规范化
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        self.delay_seconds = normalize_delay(self.delay_seconds).as_secs() as f64;

        for key in self.events.keys() {
            key.parse::<EventCategory>()
                .map_err(|e| ConfigError::Invalid(format!("events: {}", e)))?;
        }

        if self.ntfy.enabled {
            if self.ntfy.topic.trim().is_empty() {
                return Err(ConfigError::Invalid("ntfy.topic is required".to_string()));
            }
            check_url("ntfy.server", &self.ntfy.server)?;
            if let Some(p) = self.ntfy.priority {
                if !(1..=5).contains(&p) {
                    return Err(ConfigError::Invalid(format!(
                        "ntfy.priority must be between 1 and 5, got {}",
                        p
                    )));
                }
            }
        }
        if self.telegram.enabled {
            if self.telegram.bot_token.trim().is_empty() {
                return Err(ConfigError::Invalid("telegram.botToken is required".to_string()));
            }
            if self.telegram.chat_id.trim().is_empty() {
                return Err(ConfigError::Invalid("telegram.chatId is required".to_string()));
            }
        }
        if self.discord.enabled {
            check_url("discord.webhookUrl", &self.discord.webhook_url)?;
        }
        if self.slack.enabled {
            check_url("slack.webhookUrl", &self.slack.webhook_url)?;
        }
        if self.webhook.enabled {
            check_url("webhook.url", &self.webhook.url)?;
        }

        Ok(())
    }

    /// 规范化后的延迟
    pub fn delay(&self) -> Duration {
        normalize_delay(self.delay_seconds)
    }

    /// 渠道覆盖优先，否则取全局默认
    pub fn effective_direction(&self, provider: Option<TruncateDirection>) -> TruncateDirection {
        provider.unwrap_or(self.truncate_direction)
    }

    /// 未列出的类别默认启用
    pub fn is_event_enabled(&self, category: EventCategory) -> bool {
        self.events.get(category.as_str()).copied().unwrap_or(true)
    }

    /// 已启用渠道名称
    pub fn enabled_providers(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.ntfy.enabled {
            names.push("ntfy");
        }
        if self.telegram.enabled {
            names.push("telegram");
        }
        if self.discord.enabled {
            names.push("discord");
        }
        if self.slack.enabled {
            names.push("slack");
        }
        if self.webhook.enabled {
            names.push("webhook");
        }
        names
    }

    /// 用于展示的配置，密钥打码
    pub fn redacted(&self) -> Value {
        let mut copy = self.clone();
        if let Some(token) = copy.ntfy.token.as_mut() {
            *token = mask(token);
        }
        copy.telegram.bot_token = mask(&copy.telegram.bot_token);
        copy.discord.webhook_url = mask(&copy.discord.webhook_url);
        copy.slack.webhook_url = mask(&copy.slack.webhook_url);
        for value in copy.webhook.headers.values_mut() {
            *value = mask(value);
        }
        serde_json::to_value(copy).unwrap_or(Value::Null)
    }
}

/// 延迟只接受有限、非负的整数秒；负数、小数、NaN、无穷都视为 0（立即发送）
pub fn normalize_delay(secs: f64) -> Duration {
    if secs.is_finite() && secs >= 0.0 && secs.fract() == 0.0 {
        // 超出 u64 的值按 u64::MAX 饱和
        Duration::from_secs(secs as u64)
    } else {
        Duration::ZERO
    }
}

fn check_url(field: &str, url: &str) -> Result<(), ConfigError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{} must be an http(s) URL, got '{}'",
            field, url
        )))
    }
}

fn mask(secret: &str) -> String {
    if secret.is_empty() {
        return String::new();
    }
    let visible: String = secret.chars().take(4).collect();
    format!("{}****", visible)
}

/// 深度合并：对象逐键合并，其他类型直接覆盖
pub fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn env_ref_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env ref regex"))
}

/// 递归替换所有字符串中的 `${VAR}`
pub fn resolve_env_refs(value: &mut Value) -> Result<(), ConfigError> {
    match value {
        Value::String(s) => {
            if s.contains("${") {
                *s = expand_env(s)?;
            }
        }
        Value::Array(items) => {
            for item in items {
                resolve_env_refs(item)?;
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                resolve_env_refs(item)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn expand_env(input: &str) -> Result<String, ConfigError> {
    let pattern = env_ref_pattern();
    let mut result = String::with_capacity(input.len());
    let mut last = 0;

    for caps in pattern.captures_iter(input) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let value = std::env::var(name.as_str())
            .map_err(|_| ConfigError::MissingEnvVar(name.as_str().to_string()))?;
        result.push_str(&input[last..whole.start()]);
        result.push_str(&value);
        last = whole.end();
    }
    result.push_str(&input[last..]);

    Ok(result)
}
