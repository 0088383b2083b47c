//! 通知载荷 - 事件类别与不可变的通知内容

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 事件类别（封闭集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventCategory {
    /// 主会话任务完成
    TaskComplete,
    /// 子 agent 任务完成
    SubtaskComplete,
    /// 会话出错
    Error,
    /// 等待权限确认
    PermissionRequest,
    /// 等待用户澄清问题
    ClarificationRequest,
}

impl EventCategory {
    pub const ALL: [EventCategory; 5] = [
        EventCategory::TaskComplete,
        EventCategory::SubtaskComplete,
        EventCategory::Error,
        EventCategory::PermissionRequest,
        EventCategory::ClarificationRequest,
    ];

    /// 配置与日志中使用的名称
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::TaskComplete => "task-complete",
            EventCategory::SubtaskComplete => "subtask-complete",
            EventCategory::Error => "error",
            EventCategory::PermissionRequest => "permission-request",
            EventCategory::ClarificationRequest => "clarification-request",
        }
    }

    /// 立即发送类别：绕过合并，只做 500ms 去重
    pub fn is_immediate(&self) -> bool {
        matches!(self, EventCategory::Error | EventCategory::PermissionRequest)
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 未知类别名
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("unknown event category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for EventCategory {
    type Err = UnknownCategory;

    /// 大小写不敏感，`_` 与 `-` 等价
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        EventCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// 通知载荷
///
/// 由 host 集成层针对每次逻辑事件构造一次，提交给调度器后不再修改。
/// 调度器按 `category` 归并，而不是按载荷身份。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub category: EventCategory,
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_label: Option<String>,
    pub created_at_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_seconds: Option<u64>,
}

impl NotificationPayload {
    /// 创建载荷，时间戳取当前时间
    pub fn new(category: EventCategory, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            category,
            title: title.into(),
            body: body.into(),
            project_label: None,
            created_at_ms: Utc::now().timestamp_millis(),
            session_id: None,
            elapsed_seconds: None,
        }
    }

    pub fn with_project_label(mut self, label: impl Into<String>) -> Self {
        self.project_label = Some(label.into());
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_elapsed_seconds(mut self, secs: u64) -> Self {
        self.elapsed_seconds = Some(secs);
        self
    }

    pub fn with_created_at_ms(mut self, ts: i64) -> Self {
        self.created_at_ms = ts;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parse() {
        assert_eq!("task-complete".parse::<EventCategory>().unwrap(), EventCategory::TaskComplete);
        assert_eq!("Permission_Request".parse::<EventCategory>().unwrap(), EventCategory::PermissionRequest);
        assert!("session-start".parse::<EventCategory>().is_err());
    }

    #[test]
    fn test_immediate_set() {
        let immediate: Vec<_> = EventCategory::ALL.into_iter().filter(|c| c.is_immediate()).collect();
        assert_eq!(immediate, vec![EventCategory::Error, EventCategory::PermissionRequest]);
    }

    #[test]
    fn test_payload_serializes_camel_case() {
        let payload = NotificationPayload::new(EventCategory::Error, "t", "b")
            .with_session_id("ses_1")
            .with_created_at_ms(42);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["category"], "error");
        assert_eq!(json["sessionId"], "ses_1");
        assert_eq!(json["createdAtMs"], 42);
        assert!(json.get("projectLabel").is_none());
    }
}
