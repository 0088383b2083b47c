//! 消息格式化模块 - 把载荷变成各渠道可读的文本
//!
//! 设计原则：
//! 1. 简洁 - 标题一眼看懂类别和项目
//! 2. 正文放 agent 最后的输出或错误信息
//! 3. 单文本渠道（Telegram / Discord / Slack）共用同一种拼接方式

use super::payload::{EventCategory, NotificationPayload};

/// Notification message constants
pub mod msg {
    pub const TASK_COMPLETE: &str = "Task complete";
    pub const SUBTASK_COMPLETE: &str = "Subtask complete";
    pub const ERROR_OCCURRED: &str = "Session error";
    pub const PERMISSION_REQUEST: &str = "Permission needed";
    pub const CLARIFICATION_REQUEST: &str = "Question for you";

    pub const EMPTY_COMPLETION: &str = "The session finished without a final message.";
    pub const UNKNOWN_ERROR: &str = "Unknown error";
}

/// 消息格式化器
pub struct MessageFormatter;

impl MessageFormatter {
    /// 从路径提取项目名（最后一个目录名）
    pub fn extract_project_name(path: &str) -> Option<String> {
        path.trim_end_matches(['/', '\\'])
            .rsplit(['/', '\\'])
            .next()
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
    }

    /// 类别的默认标题
    pub fn category_label(category: EventCategory) -> &'static str {
        match category {
            EventCategory::TaskComplete => msg::TASK_COMPLETE,
            EventCategory::SubtaskComplete => msg::SUBTASK_COMPLETE,
            EventCategory::Error => msg::ERROR_OCCURRED,
            EventCategory::PermissionRequest => msg::PERMISSION_REQUEST,
            EventCategory::ClarificationRequest => msg::CLARIFICATION_REQUEST,
        }
    }

    /// 标题：`[project] label`
    pub fn title(category: EventCategory, project: Option<&str>) -> String {
        let label = Self::category_label(category);
        match project {
            Some(p) => format!("[{}] {}", p, label),
            None => label.to_string(),
        }
    }

    /// 时长格式化：`45s`、`2m 5s`、`1h 3m`
    pub fn format_elapsed(secs: u64) -> String {
        let hours = secs / 3600;
        let minutes = (secs % 3600) / 60;
        let seconds = secs % 60;
        if hours > 0 {
            format!("{}h {}m", hours, minutes)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }

    /// 正文加上耗时尾注
    pub fn body_with_footer(payload: &NotificationPayload) -> String {
        match payload.elapsed_seconds {
            Some(secs) if !payload.body.is_empty() => {
                format!("{}\n\n⏱ {}", payload.body, Self::format_elapsed(secs))
            }
            Some(secs) => format!("⏱ {}", Self::format_elapsed(secs)),
            None => payload.body.clone(),
        }
    }

    /// 单文本渠道：标题一行，空行，正文
    pub fn plain_text(title: &str, body: &str) -> String {
        if body.is_empty() {
            title.to_string()
        } else {
            format!("{}\n\n{}", title, body)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_project_name() {
        assert_eq!(MessageFormatter::extract_project_name("/home/dev/my-app"), Some("my-app".to_string()));
        assert_eq!(MessageFormatter::extract_project_name("/home/dev/my-app/"), Some("my-app".to_string()));
        assert_eq!(MessageFormatter::extract_project_name("C:\\work\\api"), Some("api".to_string()));
        assert_eq!(MessageFormatter::extract_project_name(""), None);
        assert_eq!(MessageFormatter::extract_project_name("/"), None);
    }

    #[test]
    fn test_title() {
        assert_eq!(
            MessageFormatter::title(EventCategory::PermissionRequest, Some("api")),
            "[api] Permission needed"
        );
        assert_eq!(MessageFormatter::title(EventCategory::Error, None), "Session error");
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(MessageFormatter::format_elapsed(0), "0s");
        assert_eq!(MessageFormatter::format_elapsed(45), "45s");
        assert_eq!(MessageFormatter::format_elapsed(125), "2m 5s");
        assert_eq!(MessageFormatter::format_elapsed(3780), "1h 3m");
    }

    #[test]
    fn test_body_with_footer() {
        let payload = NotificationPayload::new(EventCategory::TaskComplete, "t", "All tests pass")
            .with_elapsed_seconds(65);
        assert_eq!(MessageFormatter::body_with_footer(&payload), "All tests pass\n\n⏱ 1m 5s");

        let payload = NotificationPayload::new(EventCategory::TaskComplete, "t", "").with_elapsed_seconds(5);
        assert_eq!(MessageFormatter::body_with_footer(&payload), "⏱ 5s");

        let payload = NotificationPayload::new(EventCategory::Error, "t", "boom");
        assert_eq!(MessageFormatter::body_with_footer(&payload), "boom");
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(MessageFormatter::plain_text("Title", ""), "Title");
        assert_eq!(MessageFormatter::plain_text("Title", "Body"), "Title\n\nBody");
    }
}
