//! 文本截断 - 按渠道长度上限保留头部或尾部

use serde::{Deserialize, Serialize};

/// 截断标记
pub const ELLIPSIS: &str = "...";
const ELLIPSIS_LEN: usize = 3;

/// 所有渠道共用的标题长度上限
pub const MAX_TITLE_LEN: usize = 250;

/// 截断方向
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TruncateDirection {
    /// 保留开头，在末尾加标记
    #[default]
    End,
    /// 保留结尾，在开头加标记
    Start,
}

/// 标题总是保留开头
pub fn truncate_title(title: &str) -> String {
    truncate(title, MAX_TITLE_LEN, TruncateDirection::End)
}

/// 将文本限制在 `max_len` 个字符内
///
/// 长度按 Unicode 标量计数，不会切断多字节字符。
/// `max_len` 不大于标记长度时只返回标记本身。
pub fn truncate(text: &str, max_len: usize, direction: TruncateDirection) -> String {
    let len = text.chars().count();
    if len <= max_len {
        return text.to_string();
    }
    if max_len <= ELLIPSIS_LEN {
        return ELLIPSIS.to_string();
    }

    let keep = max_len - ELLIPSIS_LEN;
    match direction {
        TruncateDirection::End => {
            let head: String = text.chars().take(keep).collect();
            format!("{}{}", head, ELLIPSIS)
        }
        TruncateDirection::Start => {
            let tail: String = text.chars().skip(len - keep).collect();
            format!("{}{}", ELLIPSIS, tail)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_unchanged() {
        assert_eq!(truncate("short", 10, TruncateDirection::End), "short");
        assert_eq!(truncate("exact", 5, TruncateDirection::Start), "exact");
        assert_eq!(truncate("", 0, TruncateDirection::End), "");
    }

    #[test]
    fn test_truncate_title_keeps_head() {
        let long = "t".repeat(400);
        let out = truncate_title(&long);
        assert_eq!(out.chars().count(), MAX_TITLE_LEN);
        assert!(out.starts_with("ttt"));
        assert!(out.ends_with(ELLIPSIS));
        assert_eq!(truncate_title("[api] Task complete"), "[api] Task complete");
    }

    #[test]
    fn test_truncate_end() {
        let out = truncate("this is a long message", 10, TruncateDirection::End);
        assert_eq!(out, "this is...");
        assert_eq!(out.chars().count(), 10);
    }

    #[test]
    fn test_truncate_start() {
        let out = truncate("this is a long message", 10, TruncateDirection::Start);
        assert_eq!(out, "...message");
    }

    #[test]
    fn test_tiny_limit_returns_indicator() {
        assert_eq!(truncate("abcdef", 3, TruncateDirection::End), "...");
        assert_eq!(truncate("abcdef", 1, TruncateDirection::Start), "...");
        assert_eq!(truncate("abcdef", 0, TruncateDirection::End), "...");
    }

    #[test]
    fn test_multibyte_safe() {
        let out = truncate("等待用户确认权限请求", 6, TruncateDirection::End);
        assert_eq!(out, "等待用...");
        let out = truncate("等待用户确认权限请求", 6, TruncateDirection::Start);
        assert_eq!(out, "...限请求");
    }

    #[test]
    fn test_end_keeps_prefix_for_all_limits() {
        let text = "abcdefghijklmnopqrstuvwxyz";
        for max in 4..text.len() {
            let out = truncate(text, max, TruncateDirection::End);
            assert_eq!(out.chars().count(), max);
            assert!(text.starts_with(&out[..max - 3]));
            assert!(out.ends_with(ELLIPSIS));
        }
    }
}
