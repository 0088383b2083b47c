//! Host 集成层 - 把编码会话的生命周期事件翻译成通知载荷
//!
//! host 事件以 JSON 记录形式到达（每行一条或 hook 的 stdin）：
//! ```text
//! {"type":"session.idle","sessionId":"ses_1","cwd":"/work/api","lastAssistantText":"Done"}
//! ```

use crate::config::NotifierConfig;
use crate::notification::formatter::{msg, MessageFormatter};
use crate::notification::payload::{EventCategory, NotificationPayload};
use crate::notification::scheduler::DispatchScheduler;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::{debug, info};

/// 视为"向用户提问"的工具名（小写比较）
const CLARIFICATION_TOOLS: [&str; 2] = ["question", "askuserquestion"];

/// host 事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostEventKind {
    #[serde(rename = "session.idle", alias = "session-idle")]
    SessionIdle,
    #[serde(rename = "session.error", alias = "session-error")]
    SessionError,
    #[serde(rename = "permission.request", alias = "permission-request")]
    PermissionRequest,
    #[serde(rename = "tool.invoke", alias = "tool-invoke")]
    ToolInvoke,
}

/// host 事件记录
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostEvent {
    #[serde(rename = "type")]
    pub kind: HostEventKind,
    #[serde(default)]
    pub session_id: Option<String>,
    /// 有父会话即为子 agent
    #[serde(default)]
    pub parent_session_id: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    /// 会话开始时间（hook 单次调用时由 host 提供）
    #[serde(default)]
    pub started_at_ms: Option<i64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub last_assistant_text: Option<String>,
}

impl HostEvent {
    /// 创建只带类型的事件
    pub fn new(kind: HostEventKind) -> Self {
        Self {
            kind,
            session_id: None,
            parent_session_id: None,
            cwd: None,
            started_at_ms: None,
            error: None,
            tool: None,
            message: None,
            last_assistant_text: None,
        }
    }

    /// 带父会话的是子代理
    pub fn is_subagent(&self) -> bool {
        self.parent_session_id
            .as_deref()
            .is_some_and(|p| !p.trim().is_empty())
    }

    fn is_clarification_tool(&self) -> bool {
        self.tool
            .as_deref()
            .map(|t| CLARIFICATION_TOOLS.contains(&t.to_lowercase().as_str()))
            .unwrap_or(false)
    }
}

/// 记录每个会话本轮开始活动的时间，用于计算耗时
#[derive(Debug, Default)]
pub struct SessionTracker {
    started: HashMap<String, i64>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 首次看到会话时记录时间
    pub fn observe(&mut self, session_id: &str, now_ms: i64) {
        self.started.entry(session_id.to_string()).or_insert(now_ms);
    }

    /// 从首次活动到 `now_ms` 的秒数
    pub fn elapsed_seconds(&self, session_id: &str, now_ms: i64) -> Option<u64> {
        self.started
            .get(session_id)
            .map(|start| (now_ms.saturating_sub(*start)).max(0) as u64 / 1000)
    }

    /// 本轮结束，下次活动重新计时
    pub fn finish(&mut self, session_id: &str) {
        self.started.remove(session_id);
    }
}

/// 退出时只 flush 一次
#[derive(Debug, Default)]
pub struct ExitGuard {
    flushed: AtomicBool,
}

impl ExitGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// 首次调用时 flush 并返回 true，之后直接返回 false
    pub async fn flush_once(&self, scheduler: &DispatchScheduler) -> bool {
        if self.flushed.swap(true, Ordering::SeqCst) {
            return false;
        }
        scheduler.flush().await;
        true
    }
}

/// host 集成：事件 → 载荷 → 调度器
pub struct HostIntegration {
    scheduler: DispatchScheduler,
    config: NotifierConfig,
    sessions: Mutex<SessionTracker>,
    exit_guard: ExitGuard,
}

impl HostIntegration {
    /// 创建 host 集成
    pub fn new(scheduler: DispatchScheduler, config: NotifierConfig) -> Self {
        Self {
            scheduler,
            config,
            sessions: Mutex::new(SessionTracker::new()),
            exit_guard: ExitGuard::new(),
        }
    }

    /// 底层调度器
    pub fn scheduler(&self) -> &DispatchScheduler {
        &self.scheduler
    }

    /// 翻译事件；不需要通知的事件返回 None
    pub fn to_payload(&self, event: &HostEvent) -> Option<NotificationPayload> {
        self.to_payload_at(event, Utc::now().timestamp_millis())
    }

    /// 同 [`Self::to_payload`]，时间由调用方给出
    pub fn to_payload_at(&self, event: &HostEvent, now_ms: i64) -> Option<NotificationPayload> {
        let mut sessions = match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(id) = &event.session_id {
            match event.started_at_ms {
                Some(start) => {
                    sessions.started.insert(id.clone(), start);
                }
                None => sessions.observe(id, now_ms),
            }
        }

        let (category, body) = match event.kind {
            HostEventKind::SessionIdle => {
                let category = if event.is_subagent() {
                    EventCategory::SubtaskComplete
                } else {
                    EventCategory::TaskComplete
                };
                let body = event
                    .last_assistant_text
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .unwrap_or(msg::EMPTY_COMPLETION)
                    .to_string();
                (category, body)
            }
            HostEventKind::SessionError => {
                let body = event
                    .error
                    .clone()
                    .or_else(|| event.message.clone())
                    .unwrap_or_else(|| msg::UNKNOWN_ERROR.to_string());
                (EventCategory::Error, body)
            }
            HostEventKind::PermissionRequest => {
                let body = match (&event.tool, &event.message) {
                    (Some(tool), Some(message)) => format!("{}: {}", tool, message),
                    (Some(tool), None) => tool.clone(),
                    (None, Some(message)) => message.clone(),
                    (None, None) => String::new(),
                };
                (EventCategory::PermissionRequest, body)
            }
            HostEventKind::ToolInvoke => {
                if !event.is_clarification_tool() {
                    debug!(tool = ?event.tool, "Tool invocation, no notification");
                    return None;
                }
                (
                    EventCategory::ClarificationRequest,
                    event.message.clone().unwrap_or_default(),
                )
            }
        };

        if !self.config.is_event_enabled(category) {
            debug!(%category, "Event category disabled, skipping");
            return None;
        }

        let project = event
            .cwd
            .as_deref()
            .and_then(MessageFormatter::extract_project_name);
        let title = MessageFormatter::title(category, project.as_deref());

        let mut payload = NotificationPayload::new(category, title, body).with_created_at_ms(now_ms);
        if let Some(project) = project {
            payload = payload.with_project_label(project);
        }
        if let Some(id) = &event.session_id {
            if matches!(category, EventCategory::TaskComplete | EventCategory::SubtaskComplete) {
                if let Some(secs) = sessions.elapsed_seconds(id, now_ms) {
                    payload = payload.with_elapsed_seconds(secs);
                }
                sessions.finish(id);
            }
            payload = payload.with_session_id(id.clone());
        }

        Some(payload)
    }

    /// 处理一条事件，返回是否提交给调度器
    pub async fn handle(&self, event: &HostEvent) -> bool {
        match self.to_payload(event) {
            Some(payload) => {
                info!(category = %payload.category, session_id = ?payload.session_id, "Submitting notification");
                self.scheduler.submit(payload).await;
                true
            }
            None => false,
        }
    }

    /// 退出前发送挂起的通知（只执行一次）
    pub async fn shutdown(&self) -> bool {
        self.exit_guard.flush_once(&self.scheduler).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::error_log::TracingLog;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn integration(config: serde_json::Value) -> HostIntegration {
        let config = NotifierConfig::from_value(config).unwrap();
        let scheduler = DispatchScheduler::new(Vec::new(), Duration::from_secs(1), Arc::new(TracingLog));
        HostIntegration::new(scheduler, config)
    }

    fn parse(value: serde_json::Value) -> HostEvent {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_parse_host_event() {
        let event = parse(json!({
            "type": "session.idle",
            "sessionId": "ses_1",
            "parentSessionId": "ses_0",
            "cwd": "/work/api"
        }));
        assert_eq!(event.kind, HostEventKind::SessionIdle);
        assert!(event.is_subagent());

        let event = parse(json!({ "type": "permission-request" }));
        assert_eq!(event.kind, HostEventKind::PermissionRequest);
        assert!(!event.is_subagent());
    }

    #[test]
    fn test_idle_maps_to_task_complete() {
        let host = integration(json!({}));
        let event = parse(json!({
            "type": "session.idle",
            "sessionId": "ses_1",
            "cwd": "/work/api",
            "lastAssistantText": "  All tests pass  "
        }));
        let payload = host.to_payload_at(&event, 10_000).unwrap();
        assert_eq!(payload.category, EventCategory::TaskComplete);
        assert_eq!(payload.title, "[api] Task complete");
        assert_eq!(payload.body, "All tests pass");
        assert_eq!(payload.project_label.as_deref(), Some("api"));
        assert_eq!(payload.session_id.as_deref(), Some("ses_1"));
    }

    #[test]
    fn test_subagent_idle_maps_to_subtask() {
        let host = integration(json!({}));
        let event = parse(json!({ "type": "session.idle", "sessionId": "ses_2", "parentSessionId": "ses_1" }));
        let payload = host.to_payload_at(&event, 0).unwrap();
        assert_eq!(payload.category, EventCategory::SubtaskComplete);
        assert_eq!(payload.body, msg::EMPTY_COMPLETION);
    }

    #[test]
    fn test_elapsed_from_first_activity() {
        let host = integration(json!({}));
        let tool = parse(json!({ "type": "tool.invoke", "sessionId": "ses_1", "tool": "bash" }));
        assert!(host.to_payload_at(&tool, 1_000).is_none());

        let idle = parse(json!({ "type": "session.idle", "sessionId": "ses_1" }));
        let payload = host.to_payload_at(&idle, 126_000).unwrap();
        assert_eq!(payload.elapsed_seconds, Some(125));

        // 新一轮重新计时
        let payload = host.to_payload_at(&idle, 130_000).unwrap();
        assert_eq!(payload.elapsed_seconds, Some(0));
    }

    #[test]
    fn test_started_at_from_host() {
        let host = integration(json!({}));
        let idle = parse(json!({ "type": "session.idle", "sessionId": "s", "startedAtMs": 1_000 }));
        let payload = host.to_payload_at(&idle, 61_000).unwrap();
        assert_eq!(payload.elapsed_seconds, Some(60));
    }

    #[test]
    fn test_error_and_permission() {
        let host = integration(json!({}));
        let err = parse(json!({ "type": "session.error", "error": "rate limited" }));
        let payload = host.to_payload_at(&err, 0).unwrap();
        assert_eq!(payload.category, EventCategory::Error);
        assert_eq!(payload.body, "rate limited");
        assert!(payload.elapsed_seconds.is_none());

        let perm = parse(json!({ "type": "permission.request", "tool": "bash", "message": "rm -rf dist" }));
        let payload = host.to_payload_at(&perm, 0).unwrap();
        assert_eq!(payload.category, EventCategory::PermissionRequest);
        assert_eq!(payload.body, "bash: rm -rf dist");
    }

    #[test]
    fn test_clarification_tool() {
        let host = integration(json!({}));
        let ask = parse(json!({ "type": "tool.invoke", "tool": "AskUserQuestion", "message": "Which DB?" }));
        let payload = host.to_payload_at(&ask, 0).unwrap();
        assert_eq!(payload.category, EventCategory::ClarificationRequest);
        assert_eq!(payload.body, "Which DB?");
    }

    #[test]
    fn test_disabled_category_dropped() {
        let host = integration(json!({ "events": { "error": false } }));
        let err = parse(json!({ "type": "session.error" }));
        assert!(host.to_payload_at(&err, 0).is_none());
    }

    #[tokio::test]
    async fn test_shutdown_flushes_once() {
        let host = integration(json!({}));
        assert!(host.shutdown().await);
        assert!(!host.shutdown().await);
    }
}
