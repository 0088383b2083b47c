//! Host 集成测试：事件流 → 调度器 → 后端

use agent_notifier::{
    Backend, BackendDescriptor, DeliveryError, DeliverySettings, EventCategory, HostEvent,
    HostIntegration, NotificationBuilder, NotificationPayload, NotifierConfig, TracingLog,
};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct CollectingBackend {
    received: Mutex<Vec<NotificationPayload>>,
}

impl CollectingBackend {
    fn received(&self) -> Vec<NotificationPayload> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Backend for CollectingBackend {
    async fn deliver(
        &self,
        _settings: &DeliverySettings,
        payload: &NotificationPayload,
        _cancel: CancellationToken,
    ) -> Result<(), DeliveryError> {
        self.received.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

fn host(config: serde_json::Value) -> (HostIntegration, Arc<CollectingBackend>) {
    let config = NotifierConfig::from_value(config).unwrap();
    let backend = Arc::new(CollectingBackend::default());
    let scheduler = NotificationBuilder::new()
        .failure_log(Arc::new(TracingLog))
        .backend(BackendDescriptor::new("collect", backend.clone(), DeliverySettings::default()))
        .build(&config)
        .unwrap();
    (HostIntegration::new(scheduler, config), backend)
}

fn event(value: serde_json::Value) -> HostEvent {
    serde_json::from_value(value).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_event_stream_with_delay() {
    let (host, backend) = host(json!({ "delaySeconds": 3 }));

    let stream = [
        json!({ "type": "tool.invoke", "sessionId": "s1", "tool": "bash", "cwd": "/w/api" }),
        json!({ "type": "session.idle", "sessionId": "s1", "cwd": "/w/api", "lastAssistantText": "draft" }),
        json!({ "type": "permission.request", "sessionId": "s1", "tool": "bash", "message": "npm publish" }),
        json!({ "type": "permission.request", "sessionId": "s1", "tool": "bash", "message": "npm publish" }),
        json!({ "type": "session.idle", "sessionId": "s1", "cwd": "/w/api", "lastAssistantText": "final" }),
    ];

    let mut submitted = 0;
    for value in stream {
        if host.handle(&event(value)).await {
            submitted += 1;
        }
    }
    assert_eq!(submitted, 4);

    // 权限请求立即发送，重复的被去重
    let received = backend.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].category, EventCategory::PermissionRequest);
    assert_eq!(received[0].body, "bash: npm publish");

    tokio::time::sleep(Duration::from_secs(4)).await;
    let received = backend.received();
    assert_eq!(received.len(), 2);
    assert_eq!(received[1].category, EventCategory::TaskComplete);
    assert_eq!(received[1].body, "final");
    assert_eq!(received[1].title, "[api] Task complete");
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_flushes_pending() {
    let (host, backend) = host(json!({ "delaySeconds": 600 }));

    host.handle(&event(json!({ "type": "session.idle", "sessionId": "child", "parentSessionId": "root" })))
        .await;
    host.handle(&event(json!({ "type": "tool.invoke", "tool": "question", "message": "Postgres or SQLite?" })))
        .await;
    assert!(backend.received().is_empty());

    assert!(host.shutdown().await);
    let mut categories: Vec<_> = backend.received().iter().map(|p| p.category).collect();
    categories.sort();
    assert_eq!(
        categories,
        vec![EventCategory::SubtaskComplete, EventCategory::ClarificationRequest]
    );

    // 第二次退出钩子不重复发送
    assert!(!host.shutdown().await);
    tokio::time::sleep(Duration::from_secs(700)).await;
    assert_eq!(backend.received().len(), 2);
}

#[tokio::test]
async fn test_disabled_events_never_reach_backend() {
    let (host, backend) = host(json!({ "events": { "task-complete": false } }));

    assert!(!host.handle(&event(json!({ "type": "session.idle" }))).await);
    assert!(host.handle(&event(json!({ "type": "session.error", "error": "oom" }))).await);

    let received = backend.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].body, "oom");
}
